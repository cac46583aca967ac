//! The tick: one pass over every active processor, ending in one commit.
//!
//! Per tick, for each active processor in registration order:
//!
//! 1. Read every entity currently carrying the trigger component.
//! 2. Run the processor against each one and compose the results.
//! 3. Compose the per-processor transaction into the tick's transaction.
//!
//! The combined transaction is committed once, under the runtime lock.
//! Processors never see writes from the same tick, and there is no rollback
//! if the commit fails partway.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use stacks_component::Result;

use crate::runtime::Stacks;
use crate::transaction::Transaction;

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Sequence number of the tick, starting at 1.
    pub tick_id: u64,
    /// Active processors that ran.
    pub processors_run: usize,
    /// Entities handed to processors, summed over processors.
    pub entities_processed: usize,
    /// Operations in the combined commit.
    pub operations: usize,
}

impl Stacks {
    /// Run every active processor once and commit the combined result.
    ///
    /// Processors listed in configuration but missing from the registry are
    /// skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns the first processor or reader error (nothing is committed in
    /// that case), [`stacks_component::StacksError::LockContention`] if a
    /// chain is open, or the first writer error during the commit.
    pub fn tick(&self) -> Result<TickReport> {
        let mut report = TickReport {
            tick_id: self.tick_count() + 1,
            ..TickReport::default()
        };
        let mut combined = Transaction::new();

        for name in self.processor_names() {
            if !self.is_processor_active(&name) {
                debug!(
                    tick_id = report.tick_id,
                    processor = name,
                    "skipping inactive processor"
                );
                continue;
            }
            let Some(processor) = self.registry().get(&name) else {
                warn!(
                    instance_id = self.instance_id(),
                    processor = name,
                    "listed processor is not registered"
                );
                continue;
            };

            let entities = self.read_component(processor.trigger())?;
            let mut produced = Transaction::new();
            for entity in &entities {
                produced = produced.compose(processor.process(self, entity)?);
            }
            debug!(
                tick_id = report.tick_id,
                processor = name,
                entities = entities.len(),
                operations = produced.len(),
                "processor ran"
            );

            report.processors_run += 1;
            report.entities_processed += entities.len();
            combined = combined.compose(produced);
        }

        report.operations = combined.len();
        Transaction::start(self.lock())?
            .compose(combined)
            .commit_to(self.writer().as_ref())?;
        self.advance_tick();

        debug!(
            instance_id = self.instance_id(),
            tick_id = report.tick_id,
            processors = report.processors_run,
            entities = report.entities_processed,
            operations = report.operations,
            "tick committed"
        );
        Ok(report)
    }
}

/// Configuration for [`TickLoop`].
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Target ticks per second (0 = run ticks back to back).
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
        }
    }
}

/// Drives [`Stacks::tick`] repeatedly at a fixed rate.
#[derive(Debug, Clone, Default)]
pub struct TickLoop {
    config: TickConfig,
}

impl TickLoop {
    /// Create a tick loop with the given configuration.
    #[must_use]
    pub fn new(config: TickConfig) -> Self {
        Self { config }
    }

    /// Returns the loop configuration.
    #[must_use]
    pub fn config(&self) -> &TickConfig {
        &self.config
    }

    /// Tick until `stop` returns `true` for a report or `max_ticks` ticks
    /// have run. Returns the number of ticks run.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first tick error.
    pub fn run<F>(&self, stacks: &Stacks, mut stop: F) -> Result<u64>
    where
        F: FnMut(&Stacks, &TickReport) -> bool,
    {
        let budget = (self.config.tick_rate > 0.0)
            .then(|| Duration::from_secs_f64(1.0 / self.config.tick_rate));
        let mut tick_count = 0u64;

        info!(
            instance_id = stacks.instance_id(),
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting tick loop"
        );

        loop {
            let start = Instant::now();
            let report = stacks.tick()?;
            tick_count += 1;

            if stop(stacks, &report) {
                info!(ticks = tick_count, "tick loop stopped");
                break;
            }
            if self.config.max_ticks > 0 && tick_count >= self.config.max_ticks {
                info!(ticks = tick_count, "tick loop complete");
                break;
            }

            let Some(budget) = budget else { continue };
            let elapsed = start.elapsed();
            if elapsed < budget {
                std::thread::sleep(budget - elapsed);
            } else {
                warn!(
                    tick_id = report.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = budget.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
        Ok(tick_count)
    }
}

#[cfg(test)]
mod tests {
    use stacks_component::{Component, ComponentKind, StacksError, TRANSIENT};

    use super::*;

    const ENERGY: Component = Component::new("ENERGY", ComponentKind::Integer);
    const MESSAGE: Component = Component::new("MESSAGE", ComponentKind::String);
    const NAME: Component = Component::new("NAME", ComponentKind::String);
    const ALIVE: Component = Component::flag("ALIVE");
    const PERSON: Component = Component::flag("PERSON");
    const HAT: Component = Component::flag("HAT");

    fn fast() -> TickLoop {
        TickLoop::new(TickConfig {
            tick_rate: 0.0,
            max_ticks: 100,
        })
    }

    /// Spends 5 energy per tick and dies once none is left.
    fn register_energy(stacks: &mut Stacks) {
        stacks.register_processor("energy", ENERGY, |_, entity| {
            let id = entity.identifier()?;
            let energy = entity.long_value(&ENERGY).unwrap_or(0);
            if energy <= 0 {
                return Ok(Transaction::new().remove_component(id, &ALIVE));
            }
            Transaction::new().alter_value(entity, &ENERGY, -5)
        });
    }

    fn spawn(stacks: &Stacks, energy: i64) -> i64 {
        let id = stacks.next_id();
        stacks
            .transaction()
            .assign_long(id, &ENERGY, energy)
            .unwrap()
            .assign_flag(id, &ALIVE)
            .unwrap()
            .create_entity(id)
            .commit()
            .unwrap();
        id
    }

    #[test]
    fn test_energy_runs_out_after_eleven_ticks() {
        let mut stacks = Stacks::in_memory();
        register_energy(&mut stacks);
        let id = spawn(&stacks, 50);

        let ticks = fast()
            .run(&stacks, |stacks, _| {
                !stacks.read_id(id).unwrap().unwrap().is(&ALIVE)
            })
            .unwrap();
        assert_eq!(ticks, 11);
        assert_eq!(stacks.tick_count(), 11);
        let entity = stacks.read_id(id).unwrap().unwrap();
        assert_eq!(entity.long_value(&ENERGY), Some(0));
    }

    #[test]
    fn test_death_message_is_created_then_expired() {
        let mut stacks = Stacks::in_memory();
        stacks.register_processor("energy", ENERGY, |stacks, entity| {
            let id = entity.identifier()?;
            if entity.long_value(&ENERGY).unwrap_or(0) > 0 {
                return Transaction::new().alter_value(entity, &ENERGY, -5);
            }
            let message = stacks.next_id();
            let obituary = Transaction::new()
                .expire(id)
                .assign_string(message, &MESSAGE, format!("{id} died"))?
                .create_transient_entity(message);
            Ok(obituary)
        });
        stacks.register_processor("messages", MESSAGE, |_, entity| {
            Ok(Transaction::new().expire(entity.identifier()?))
        });
        let id = spawn(&stacks, 10);

        // 10 → 5 → 0, then the entity dies and leaves a message behind.
        for _ in 0..3 {
            stacks.tick().unwrap();
        }
        assert!(stacks.read_id(id).unwrap().is_none());
        let messages = stacks.read_component(&MESSAGE).unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is(&TRANSIENT));
        let expected = format!("{id} died");
        assert_eq!(messages[0].string_value(&MESSAGE), Some(expected.as_str()));

        // The message processor clears it on the following tick.
        stacks.tick().unwrap();
        assert!(stacks.read_component(&MESSAGE).unwrap().is_empty());
    }

    #[test]
    fn test_hats_are_assigned_once() {
        let mut stacks = Stacks::in_memory();
        stacks.register_processor("hats", PERSON, |_, entity| {
            if entity.is(&HAT) {
                return Ok(Transaction::new());
            }
            Transaction::new().assign_flag(entity.identifier()?, &HAT)
        });
        for _ in 0..3 {
            let id = stacks.next_id();
            stacks
                .transaction()
                .create_entity_with(id, &[PERSON])
                .unwrap()
                .commit()
                .unwrap();
        }

        let first = stacks.tick().unwrap();
        assert_eq!(first.entities_processed, 3);
        assert_eq!(first.operations, 3);
        assert_eq!(stacks.read_all(&[PERSON, HAT]).unwrap().len(), 3);

        let second = stacks.tick().unwrap();
        assert_eq!(second.tick_id, 2);
        assert_eq!(second.operations, 0);
    }

    #[test]
    fn test_inactive_processor_is_skipped() {
        let mut stacks = Stacks::in_memory();
        register_energy(&mut stacks);
        let id = spawn(&stacks, 50);
        stacks.set_processor_active("energy", false);

        let report = stacks.tick().unwrap();
        assert_eq!(report.processors_run, 0);
        let entity = stacks.read_id(id).unwrap().unwrap();
        assert_eq!(entity.long_value(&ENERGY), Some(50));

        stacks.set_processor_active("energy", true);
        stacks.tick().unwrap();
        let entity = stacks.read_id(id).unwrap().unwrap();
        assert_eq!(entity.long_value(&ENERGY), Some(45));
    }

    #[test]
    fn test_empty_tick_commits_noop() {
        let stacks = Stacks::in_memory();
        let report = stacks.tick().unwrap();
        assert_eq!(
            report,
            TickReport {
                tick_id: 1,
                ..TickReport::default()
            }
        );
        assert_eq!(stacks.tick_count(), 1);
        assert!(!stacks.lock().is_locked());
    }

    #[test]
    fn test_later_processor_writes_run_first() {
        let mut stacks = Stacks::in_memory();
        stacks.register_processor("first", PERSON, |_, e| {
            Transaction::new().assign_string(e.identifier()?, &NAME, "first")
        });
        stacks.register_processor("second", PERSON, |_, e| {
            Transaction::new().assign_string(e.identifier()?, &NAME, "second")
        });
        let id = stacks.next_id();
        stacks
            .transaction()
            .create_entity_with(id, &[PERSON])
            .unwrap()
            .commit()
            .unwrap();

        stacks.tick().unwrap();
        let entity = stacks.read_id(id).unwrap().unwrap();
        assert_eq!(entity.string_value(&NAME), Some("first"));
    }

    #[test]
    fn test_write_to_entity_expired_in_same_tick() {
        let mut stacks = Stacks::in_memory();
        stacks.register_processor("drain", ENERGY, |_, entity| {
            Transaction::new().alter_value(entity, &ENERGY, -1)
        });
        stacks.register_processor("reaper", ENERGY, |_, entity| {
            let id = entity.identifier()?;
            Ok(Transaction::new().expire(id))
        });
        let id = spawn(&stacks, 3);

        let first = stacks.tick().unwrap();
        assert_eq!(first.entities_processed, 2);
        assert!(stacks.read_id(id).unwrap().is_none());

        let second = stacks.tick().unwrap();
        assert_eq!(second.processors_run, 2);
        assert_eq!(second.entities_processed, 0);
        assert!(stacks.read_component(&ENERGY).unwrap().is_empty());
        assert!(!stacks.lock().is_locked());
    }

    #[test]
    fn test_tick_fails_while_chain_is_open() {
        let stacks = Stacks::in_memory();
        let chain = stacks.begin().unwrap();
        assert!(matches!(stacks.tick().unwrap_err(), StacksError::LockContention));
        assert_eq!(stacks.tick_count(), 0);

        chain.commit().unwrap();
        assert_eq!(stacks.tick().unwrap().tick_id, 1);
    }

    #[test]
    fn test_processor_error_leaves_lock_free() {
        let mut stacks = Stacks::in_memory();
        stacks.register_processor("broken", ENERGY, |_, _| {
            Err(StacksError::lookup("configuration entry", "broken"))
        });
        spawn(&stacks, 5);
        assert!(stacks.tick().is_err());
        assert!(!stacks.lock().is_locked());
        assert_eq!(stacks.tick_count(), 0);
    }

    #[test]
    fn test_unregistered_listed_processor_is_skipped() {
        let mut overrides = crate::config::Configuration::new();
        overrides.set(crate::config::PROCESSOR_LIST, "ghost");
        overrides.set_flag(crate::config::processor_active_key("ghost"), true);
        let stacks = Stacks::builder().configuration(overrides).build().unwrap();
        assert_eq!(stacks.tick().unwrap().processors_run, 0);
    }

    #[test]
    fn test_loop_respects_max_ticks() {
        let stacks = Stacks::in_memory();
        let tick_loop = TickLoop::new(TickConfig {
            tick_rate: 1000.0,
            max_ticks: 3,
        });
        assert_eq!(tick_loop.run(&stacks, |_, _| false).unwrap(), 3);
        assert_eq!(stacks.tick_count(), 3);
    }
}
