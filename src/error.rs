//! Fehlerdefinitionen für Registry, Konfiguration und Skripte
//!
//! Router operations themselves never fail; these errors only surface while
//! loading assets and configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Fehlertypen beim Laden von Layer-Assets
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Referenz zeigt auf kein Asset
    #[error("Layer asset not found: {0}")]
    MissingAsset(String),

    /// Datei konnte nicht gelesen werden
    #[error("Failed to read layer asset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML-Inhalt ist ungültig
    #[error("Failed to parse layer asset {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Handler-Vorlage ist unvollständig
    #[error("Invalid handler template: {0}")]
    InvalidTemplate(String),

    /// Asset wurde geladen, trägt aber einen anderen Tag
    #[error("Layer asset tag mismatch: expected {expected}, found {found}")]
    TagMismatch { expected: String, found: String },

    /// Lade-Task wurde abgebrochen
    #[error("Async load task failed: {0}")]
    TaskFailed(String),
}

/// Fehlertypen der Konfiguration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Kein Konfigurationsverzeichnis auf dieser Plattform
    #[error("No config directory available")]
    NoConfigDir,
}

/// Fehlertypen beim Abspielen eines Eingabe-Skripts
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Failed to read script {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse script {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
