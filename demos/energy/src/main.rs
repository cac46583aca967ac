//! Energy demo: creatures burn energy every tick until they die.
//!
//! Each creature starts with some `ENERGY` and the `ALIVE` flag. The
//! `metabolism` processor drains 5 energy per tick; once a creature has none
//! left it is expired and a transient `MESSAGE` entity announces the death.
//! The `obituary` processor logs each message and expires it on the next
//! tick. The loop stops once nothing is alive and every obituary is out.
//!
//! Set `STACKS_CONFIG` to a JSON file of configuration overrides, for
//! example `{"stacks.processor.obituary.active": "false"}`.

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use stacks_component::{Component, ComponentKind};
use stacks_system::{Configuration, Stacks, TickConfig, TickLoop, Transaction};

const NAME: Component = Component::new("NAME", ComponentKind::String);
const ENERGY: Component = Component::new("ENERGY", ComponentKind::Integer);
const MESSAGE: Component = Component::new("MESSAGE", ComponentKind::String);
const ALIVE: Component = Component::flag("ALIVE");

const CREATURES: [(&str, i64); 3] = [("ant", 10), ("bee", 25), ("cat", 50)];

fn load_overrides() -> Result<Configuration> {
    let Ok(path) = std::env::var("STACKS_CONFIG") else {
        return Ok(Configuration::new());
    };
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    Configuration::from_json(&text).with_context(|| format!("parsing {path}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("energy=info".parse()?))
        .init();

    let mut stacks = Stacks::builder().configuration(load_overrides()?).build()?;

    stacks.register_processor("metabolism", ENERGY, |stacks, creature| {
        let id = creature.identifier()?;
        if creature.long_value(&ENERGY).unwrap_or(0) > 0 {
            return Transaction::new().alter_value(creature, &ENERGY, -5);
        }
        let name = creature.string_value(&NAME).unwrap_or("something");
        let (message, death) = stacks.create_transient_entity(Transaction::new().expire(id));
        death.assign_string(message, &MESSAGE, format!("the {name} has died"))
    });
    stacks.register_processor("obituary", MESSAGE, |_, message| {
        info!(message = message.string_value(&MESSAGE), "obituary");
        Ok(Transaction::new().expire(message.identifier()?))
    });

    let mut chain = stacks.begin()?;
    for (name, energy) in CREATURES {
        let (id, created) = stacks.create_entity_with(Transaction::new(), &[ALIVE])?;
        chain = chain
            .assign_long(id, &ENERGY, energy)?
            .assign_string(id, &NAME, name)?
            .compose(created);
        info!(id, name, energy, "spawned creature");
    }
    chain.commit()?;

    let tick_loop = TickLoop::new(TickConfig {
        tick_rate: 10.0,
        max_ticks: 100,
    });
    let ticks = tick_loop.run(&stacks, |stacks, report| {
        let alive = stacks.read_component(&ALIVE).map(|c| c.len()).unwrap_or(0);
        let pending = stacks.read_component(&MESSAGE).map(|m| m.len()).unwrap_or(0);
        info!(tick_id = report.tick_id, alive, pending, "tick");
        alive == 0 && pending == 0
    })?;

    info!(ticks, "every creature has died");
    Ok(())
}
