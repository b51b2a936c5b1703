//! Persona registry.
//!
//! Personas are authored in a JSON file keyed by persona id and loaded once
//! at startup. A missing or malformed file is a fatal configuration error:
//! the engine must never run with a partial persona set. After loading, the
//! registry is immutable and lookups are infallible-by-construction for any
//! id it reported at startup.

use crate::storage::StorageGateway;
use crate::types::{AppError, Persona, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct PersonaDefinition {
    name: String,
    #[serde(rename = "basePrompt")]
    base_prompt: String,
    #[serde(default)]
    description: String,
}

/// Immutable in-memory set of persona definitions.
#[derive(Debug)]
pub struct PersonaRegistry {
    personas: HashMap<String, Persona>,
}

impl PersonaRegistry {
    /// Load persona definitions from a JSON file mapping persona id to
    /// definition. Fails when the file is absent, unreadable or not the
    /// expected shape.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Persona(format!(
                "Failed to read persona file {}: {}",
                path.display(),
                e
            ))
        })?;

        let definitions: HashMap<String, PersonaDefinition> =
            serde_json::from_str(&raw).map_err(|e| {
                AppError::Persona(format!(
                    "Malformed persona file {}: {}",
                    path.display(),
                    e
                ))
            })?;

        if definitions.is_empty() {
            return Err(AppError::Persona(format!(
                "Persona file {} defines no personas",
                path.display()
            )));
        }

        let personas = definitions
            .into_iter()
            .map(|(id, def)| {
                let persona = Persona {
                    id: id.clone(),
                    name: def.name,
                    base_prompt: def.base_prompt,
                    description: def.description,
                };
                (id, persona)
            })
            .collect();

        Ok(Self { personas })
    }

    pub fn get(&self, persona_id: &str) -> Option<&Persona> {
        self.personas.get(persona_id)
    }

    pub fn contains(&self, persona_id: &str) -> bool {
        self.personas.contains_key(persona_id)
    }

    pub fn list(&self) -> Vec<&Persona> {
        let mut all: Vec<&Persona> = self.personas.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    /// Mirror every loaded persona into storage so external consumers (e.g.
    /// a dashboard) can read them. Upsert-only: personas removed from the
    /// file are left in storage untouched.
    pub async fn sync_to_storage(&self, storage: &dyn StorageGateway) -> Result<()> {
        for persona in self.personas.values() {
            storage.upsert_persona(persona).await?;
        }
        tracing::info!(count = self.personas.len(), "Synced personas to storage");
        Ok(())
    }
}
