//! Snapshot schema migration
//!
//! Migrations operate on raw JSON so that older document shapes never have to
//! match the current types. The registry holds a strict linear chain: each
//! version has at most one outgoing step, every step moves strictly forward,
//! and a missing link fails the whole migration.

use core_types::{MigrationLineage, SchemaVersion};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Default bound on the number of steps in one migration
pub const DEFAULT_MAX_CHAIN_LENGTH: usize = 64;

/// Error that can occur during migration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MigrationError {
    #[error("Migration step {from} -> {to} does not move forward")]
    NonMonotonic { from: SchemaVersion, to: SchemaVersion },

    #[error("A migration step from {from} is already registered")]
    DuplicateStep { from: SchemaVersion },

    #[error("Migration step targets {to}, beyond current version {current}")]
    BeyondCurrent { to: SchemaVersion, current: SchemaVersion },

    #[error("No migration step from {from} (needed to reach {target})")]
    MissingStep { from: SchemaVersion, target: SchemaVersion },

    #[error("Migration chain longer than {limit} steps; the registry is misconfigured")]
    ChainTooLong { limit: usize },

    #[error("Document version {found} is newer than supported version {current}")]
    UnsupportedVersion { found: SchemaVersion, current: SchemaVersion },

    #[error("Migration {from} -> {to} failed: {message}")]
    StepFailed {
        from: SchemaVersion,
        to: SchemaVersion,
        message: String,
    },
}

/// A single document transformation
pub type MigrationFn = Box<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

struct MigrationStep {
    to: SchemaVersion,
    run: MigrationFn,
}

/// Registry of migration steps toward one current version
pub struct MigrationRegistry {
    current: SchemaVersion,
    steps: BTreeMap<SchemaVersion, MigrationStep>,
    max_chain_length: usize,
}

impl MigrationRegistry {
    /// Creates an empty registry for the given current version
    pub fn new(current: SchemaVersion) -> Self {
        Self {
            current,
            steps: BTreeMap::new(),
            max_chain_length: DEFAULT_MAX_CHAIN_LENGTH,
        }
    }

    /// Registry holding the shell's own history of document shapes
    ///
    /// - 1.0 -> 1.1: workspaces gain `index`; `widgets` becomes `widgetStates`
    /// - 1.1 -> 1.2: `userData` and `applicationState.focusHistory` appear
    pub fn builtin() -> Self {
        let mut registry = Self::new(crate::CURRENT_SCHEMA_VERSION);
        let steps: [(SchemaVersion, SchemaVersion, fn(Value) -> Result<Value, String>); 2] = [
            (SchemaVersion::new(1, 0), SchemaVersion::new(1, 1), migrate_1_0_to_1_1),
            (SchemaVersion::new(1, 1), SchemaVersion::new(1, 2), migrate_1_1_to_1_2),
        ];
        for (from, to, run) in steps {
            if let Err(err) = registry.register(from, to, run) {
                tracing::error!(%from, %to, error = %err, "builtin migration step rejected");
            }
        }
        registry
    }

    /// Sets the chain length bound
    pub fn with_max_chain_length(mut self, limit: usize) -> Self {
        self.max_chain_length = limit;
        self
    }

    pub fn current(&self) -> SchemaVersion {
        self.current
    }

    /// Registers a step from one version to a strictly later one
    pub fn register<F>(&mut self, from: SchemaVersion, to: SchemaVersion, run: F) -> Result<(), MigrationError>
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        if to <= from {
            return Err(MigrationError::NonMonotonic { from, to });
        }
        if to > self.current {
            return Err(MigrationError::BeyondCurrent {
                to,
                current: self.current,
            });
        }
        if self.steps.contains_key(&from) {
            return Err(MigrationError::DuplicateStep { from });
        }
        self.steps.insert(
            from,
            MigrationStep {
                to,
                run: Box::new(run),
            },
        );
        Ok(())
    }

    /// Checks if a document at `from` can be brought to the current version
    pub fn supports(&self, from: SchemaVersion) -> bool {
        self.plan(from).is_ok()
    }

    /// Versions a document at `from` passes through, `from` first
    pub fn plan(&self, from: SchemaVersion) -> Result<Vec<SchemaVersion>, MigrationError> {
        if from > self.current {
            return Err(MigrationError::UnsupportedVersion {
                found: from,
                current: self.current,
            });
        }

        let mut path = vec![from];
        let mut version = from;
        while version != self.current {
            if path.len() > self.max_chain_length {
                return Err(MigrationError::ChainTooLong {
                    limit: self.max_chain_length,
                });
            }
            let step = self.steps.get(&version).ok_or(MigrationError::MissingStep {
                from: version,
                target: self.current,
            })?;
            version = step.to;
            path.push(version);
        }
        Ok(path)
    }

    /// Migrates a document from `from` to the current version
    ///
    /// Steps run one after another, each on the previous step's output. On
    /// any failure nothing partial is returned.
    pub fn migrate(&self, document: Value, from: SchemaVersion) -> Result<(Value, MigrationLineage), MigrationError> {
        let path = self.plan(from)?;
        let mut lineage = MigrationLineage::new(from);
        let mut document = document;

        for pair in path.windows(2) {
            let (step_from, step_to) = (pair[0], pair[1]);
            let step = self.steps.get(&step_from).ok_or(MigrationError::MissingStep {
                from: step_from,
                target: self.current,
            })?;
            document = (step.run)(document).map_err(|message| MigrationError::StepFailed {
                from: step_from,
                to: step_to,
                message,
            })?;
            if let Value::Object(map) = &mut document {
                map.insert("schemaVersion".to_string(), json!(step_to.to_string()));
            } else {
                return Err(MigrationError::StepFailed {
                    from: step_from,
                    to: step_to,
                    message: "migration produced a non-object document".to_string(),
                });
            }
            tracing::info!(from = %step_from, to = %step_to, "applied snapshot migration");
            lineage.push(step_to);
        }
        Ok((document, lineage))
    }
}

impl std::fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRegistry")
            .field("current", &self.current)
            .field("steps", &self.steps.iter().map(|(from, s)| (*from, s.to)).collect::<Vec<_>>())
            .field("max_chain_length", &self.max_chain_length)
            .finish()
    }
}

fn migrate_1_0_to_1_1(mut document: Value) -> Result<Value, String> {
    let workspaces = document
        .get_mut("workspaces")
        .and_then(Value::as_array_mut)
        .ok_or("1.0 document has no workspaces array")?;
    for (position, workspace) in workspaces.iter_mut().enumerate() {
        let map = workspace
            .as_object_mut()
            .ok_or("1.0 workspace entry is not an object")?;
        map.entry("index").or_insert_with(|| json!(position));
        if let Some(widgets) = map.remove("widgets") {
            map.insert("widgetStates".to_string(), widgets);
        }
        map.entry("widgetStates").or_insert_with(|| json!([]));
    }
    Ok(document)
}

fn migrate_1_1_to_1_2(mut document: Value) -> Result<Value, String> {
    let map = document
        .as_object_mut()
        .ok_or("1.1 document is not an object")?;
    map.entry("userData").or_insert_with(|| json!({}));
    let app = map
        .entry("applicationState")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or("1.1 applicationState is not an object")?;
    app.entry("focusHistory").or_insert_with(|| json!([]));
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(major: u32, minor: u32) -> SchemaVersion {
        SchemaVersion::new(major, minor)
    }

    fn tag(label: &'static str) -> impl Fn(Value) -> Result<Value, String> + Send + Sync {
        move |mut doc| {
            let steps = doc
                .as_object_mut()
                .ok_or("not an object")?
                .entry("steps")
                .or_insert_with(|| json!([]));
            steps.as_array_mut().ok_or("steps not an array")?.push(json!(label));
            Ok(doc)
        }
    }

    fn registry_1_2() -> MigrationRegistry {
        let mut registry = MigrationRegistry::new(v(1, 2));
        registry.register(v(1, 0), v(1, 1), tag("1.0->1.1")).unwrap();
        registry.register(v(1, 1), v(1, 2), tag("1.1->1.2")).unwrap();
        registry
    }

    #[test]
    fn test_no_migration_needed() {
        let registry = registry_1_2();
        let doc = json!({"schemaVersion": "1.2", "timestamp": 1});
        let (migrated, lineage) = registry.migrate(doc.clone(), v(1, 2)).unwrap();
        assert_eq!(migrated, doc);
        assert!(lineage.is_noop());
    }

    #[test]
    fn test_multi_step_migration_in_order() {
        let registry = registry_1_2();
        let (migrated, lineage) = registry
            .migrate(json!({"schemaVersion": "1.0"}), v(1, 0))
            .unwrap();

        assert_eq!(migrated["steps"], json!(["1.0->1.1", "1.1->1.2"]));
        assert_eq!(migrated["schemaVersion"], json!("1.2"));
        assert_eq!(lineage.path, vec![v(1, 0), v(1, 1), v(1, 2)]);
        assert!(lineage.path.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_register_rejects_backward_and_duplicate_steps() {
        let mut registry = MigrationRegistry::new(v(2, 0));
        assert_eq!(
            registry.register(v(1, 1), v(1, 1), tag("x")),
            Err(MigrationError::NonMonotonic { from: v(1, 1), to: v(1, 1) })
        );
        assert_eq!(
            registry.register(v(1, 2), v(1, 0), tag("x")),
            Err(MigrationError::NonMonotonic { from: v(1, 2), to: v(1, 0) })
        );
        registry.register(v(1, 0), v(2, 0), tag("x")).unwrap();
        assert_eq!(
            registry.register(v(1, 0), v(1, 5), tag("x")),
            Err(MigrationError::DuplicateStep { from: v(1, 0) })
        );
        assert_eq!(
            registry.register(v(1, 5), v(3, 0), tag("x")),
            Err(MigrationError::BeyondCurrent { to: v(3, 0), current: v(2, 0) })
        );
    }

    #[test]
    fn test_missing_step_fails_whole_migration() {
        let mut registry = MigrationRegistry::new(v(1, 3));
        registry.register(v(1, 0), v(1, 1), tag("1.0->1.1")).unwrap();
        registry.register(v(1, 2), v(1, 3), tag("1.2->1.3")).unwrap();

        assert_eq!(
            registry.migrate(json!({}), v(1, 0)),
            Err(MigrationError::MissingStep { from: v(1, 1), target: v(1, 3) })
        );
        assert!(!registry.supports(v(1, 0)));
        assert!(registry.supports(v(1, 2)));
    }

    #[test]
    fn test_newer_document_rejected() {
        let registry = registry_1_2();
        assert_eq!(
            registry.plan(v(1, 3)),
            Err(MigrationError::UnsupportedVersion { found: v(1, 3), current: v(1, 2) })
        );
    }

    #[test]
    fn test_chain_length_is_bounded() {
        let mut registry = MigrationRegistry::new(v(1, 10)).with_max_chain_length(3);
        for minor in 0..10 {
            registry.register(v(1, minor), v(1, minor + 1), tag("step")).unwrap();
        }
        assert_eq!(registry.plan(v(1, 0)), Err(MigrationError::ChainTooLong { limit: 3 }));
        assert_eq!(registry.plan(v(1, 7)).map(|p| p.len()), Ok(4));
    }

    #[test]
    fn test_failing_step_reports_versions() {
        let mut registry = MigrationRegistry::new(v(1, 1));
        registry
            .register(v(1, 0), v(1, 1), |_| Err("corrupt widget list".to_string()))
            .unwrap();
        assert_eq!(
            registry.migrate(json!({}), v(1, 0)),
            Err(MigrationError::StepFailed {
                from: v(1, 0),
                to: v(1, 1),
                message: "corrupt widget list".to_string()
            })
        );
    }

    #[test]
    fn test_builtin_chain_upgrades_oldest_shape() {
        let registry = MigrationRegistry::builtin();
        let legacy = json!({
            "timestamp": 10,
            "applicationState": {},
            "workspaces": [
                {"name": "main", "widgets": [{"widgetId": 1, "Count": 3}]},
                {"name": "side"}
            ]
        });
        let (migrated, lineage) = registry.migrate(legacy, v(1, 0)).unwrap();

        assert_eq!(lineage.to_version, crate::CURRENT_SCHEMA_VERSION);
        assert_eq!(migrated["workspaces"][0]["index"], json!(0));
        assert_eq!(migrated["workspaces"][1]["index"], json!(1));
        assert_eq!(migrated["workspaces"][0]["widgetStates"][0]["Count"], json!(3));
        assert_eq!(migrated["workspaces"][1]["widgetStates"], json!([]));
        assert_eq!(migrated["userData"], json!({}));
        assert_eq!(migrated["applicationState"]["focusHistory"], json!([]));

        let typed: crate::StateSnapshot = serde_json::from_value(migrated).unwrap();
        assert_eq!(typed.widget_count(), 1);
    }

    #[test]
    fn test_builtin_registers_every_step() {
        let registry = MigrationRegistry::builtin();
        assert_eq!(registry.plan(v(1, 0)).unwrap(), vec![v(1, 0), v(1, 1), v(1, 2)]);
        assert_eq!(registry.plan(v(1, 1)).unwrap(), vec![v(1, 1), v(1, 2)]);
        assert!(registry.supports(v(1, 0)));
        assert!(registry.supports(v(1, 1)));
    }
}
