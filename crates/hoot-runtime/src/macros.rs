//! Named gesture sequences resolved by the dispatcher.
//!
//! The registry is built once at startup and never mutated afterwards, so it
//! is shared as `Arc<MacroRegistry>` without a lock.

use std::collections::BTreeMap;

use hoot_types::{HootError, MacroDefinition, MovementKind, MovementStep, SpeechRequest};
use tracing::debug;

/// Greeting spoken by the `welcome` macro.
pub const WELCOME_TEXT: &str = "Hello, I'm your owl companion. I'm here to help you with \
medication reminders, health monitoring, and to keep you company!";

const BUILTIN_STEP_MS: u64 = 1000;

/// Read-only map of macro name to definition.
#[derive(Debug, Clone, Default)]
pub struct MacroRegistry {
    macros: BTreeMap<String, MacroDefinition>,
}

impl MacroRegistry {
    /// Registry with no macros at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `happy` and `welcome` macros.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for def in builtin_definitions() {
            registry.macros.insert(def.name.clone(), def);
        }
        registry
    }

    /// Built-ins plus `definitions`; a definition named like a built-in
    /// replaces it.
    ///
    /// # Errors
    ///
    /// [`HootError::Config`] when a definition has an empty name, no steps, or
    /// a zero-length step.
    pub fn with_definitions(
        definitions: impl IntoIterator<Item = MacroDefinition>,
    ) -> Result<Self, HootError> {
        let mut registry = Self::builtin();
        for def in definitions {
            validate(&def)?;
            debug!(name = %def.name, steps = def.steps.len(), "registering macro");
            registry.macros.insert(def.name.clone(), def);
        }
        Ok(registry)
    }

    /// Look up `name`.
    ///
    /// # Errors
    ///
    /// [`HootError::UnknownMacro`] when no macro is registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<&MacroDefinition, HootError> {
        self.macros
            .get(name)
            .ok_or_else(|| HootError::UnknownMacro(name.to_string()))
    }

    /// Registered names in lexical order.
    pub fn names(&self) -> Vec<&str> {
        self.macros.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

fn validate(def: &MacroDefinition) -> Result<(), HootError> {
    if def.name.trim().is_empty() {
        return Err(HootError::Config("macro name must not be empty".to_string()));
    }
    if def.steps.is_empty() {
        return Err(HootError::Config(format!("macro '{}' has no steps", def.name)));
    }
    if let Some(i) = def.steps.iter().position(|s| s.duration_ms == 0) {
        return Err(HootError::Config(format!(
            "macro '{}' step {i} has zero duration",
            def.name
        )));
    }
    Ok(())
}

fn builtin_definitions() -> Vec<MacroDefinition> {
    let step = |kind| MovementStep {
        kind,
        duration_ms: BUILTIN_STEP_MS,
        repeat: false,
    };

    let happy = [MovementKind::TiltRight, MovementKind::TiltLeft]
        .into_iter()
        .cycle()
        .take(6)
        .map(step)
        .collect();

    let welcome = vec![
        step(MovementKind::RotateRight),
        step(MovementKind::RotateLeft),
        step(MovementKind::TiltFront),
    ];

    vec![
        MacroDefinition::new("happy", happy),
        MacroDefinition::new("welcome", welcome).with_speech(SpeechRequest::new(WELCOME_TEXT)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_alternates_tilts() {
        let registry = MacroRegistry::builtin();
        let happy = registry.resolve("happy").unwrap();
        let kinds: Vec<_> = happy.steps.iter().map(|s| s.kind as u8).collect();
        assert_eq!(kinds, vec![5, 6, 5, 6, 5, 6]);
        assert!(happy.steps.iter().all(|s| s.duration_ms == 1000 && !s.repeat));
        assert!(happy.speech.is_none());
    }

    #[test]
    fn welcome_greets() {
        let registry = MacroRegistry::builtin();
        let welcome = registry.resolve("welcome").unwrap();
        let kinds: Vec<_> = welcome.steps.iter().map(|s| s.kind as u8).collect();
        assert_eq!(kinds, vec![3, 4, 1]);
        let speech = welcome.speech.as_ref().unwrap();
        assert!(speech.text.ends_with('!'), "greeting must flush on its own");
    }

    #[test]
    fn unknown_macro_is_reported_by_name() {
        let err = MacroRegistry::builtin().resolve("sad").unwrap_err();
        assert_eq!(err, HootError::UnknownMacro("sad".to_string()));
        assert_eq!(err.kind(), "UnknownMacro");
    }

    #[test]
    fn names_are_sorted() {
        assert_eq!(MacroRegistry::builtin().names(), vec!["happy", "welcome"]);
        assert!(MacroRegistry::empty().is_empty());
    }

    #[test]
    fn configured_macro_overrides_builtin() {
        let nod = MovementStep::new(MovementKind::TiltFront, 400).unwrap();
        let registry = MacroRegistry::with_definitions([
            MacroDefinition::new("happy", vec![nod]),
            MacroDefinition::new("nod", vec![nod, nod]),
        ])
        .unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.resolve("happy").unwrap().steps, vec![nod]);
        assert_eq!(registry.resolve("nod").unwrap().steps.len(), 2);
    }

    #[test]
    fn invalid_definitions_are_rejected() {
        let step = MovementStep::new(MovementKind::TiltBack, 10).unwrap();
        let zero = MovementStep {
            duration_ms: 0,
            ..step
        };
        for def in [
            MacroDefinition::new("  ", vec![step]),
            MacroDefinition::new("empty", vec![]),
            MacroDefinition::new("zero", vec![step, zero]),
        ] {
            let err = MacroRegistry::with_definitions([def]).unwrap_err();
            assert_eq!(err.kind(), "Config");
        }
    }
}
