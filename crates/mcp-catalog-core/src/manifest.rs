//! Server launch configurations and the accepted/proposed manifest state.
//!
//! A *manifest* is the list of [`ServerConfig`] variants extracted from a
//! repository's documentation. Every record carries a [`ManifestState`]:
//! the manifest curators have accepted, and optionally a re-analysis result
//! waiting for approval.
//!
//! # Wire format
//!
//! Configs are stored and exchanged in the flat JSON shape used by the
//! catalog UI:
//!
//! ```json
//! { "command": "npx", "args": ["-y", "server-a"], "env": [], "preferred": true }
//! { "url": "https://example.com/sse", "urlDescription": "...", "httpHeaders": [], "env": [] }
//! ```
//!
//! The two shapes are mutually exclusive; in Rust they are the
//! [`Launch::Command`] and [`Launch::Remote`] variants.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Errors raised while decoding or transitioning manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("server config has neither a command nor a url")]
    EmptyLaunch,
    #[error("no pending proposed manifest to approve")]
    NoPendingProposal,
    #[error("invalid manifest JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Treat an explicit JSON `null` the same as a missing field.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// An environment variable a command-launched server reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    /// Variable name as the server reads it, usually UPPER_CASE.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub key: String,
    /// Example or default value shown in the documentation.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub value: String,
    /// Human-friendly label.
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub description: String,
    #[serde(default, deserialize_with = "nullable")]
    pub required: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub sensitive: bool,
    /// The value refers to a file path.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "is_false")]
    pub file: bool,
}

/// An HTTP header a URL-launched server expects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeader {
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub key: String,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub description: String,
    #[serde(default, deserialize_with = "nullable")]
    pub required: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub sensitive: bool,
}

/// How a server is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launch {
    /// A local process started with `command args...`.
    Command {
        command: String,
        args: Vec<String>,
        env: Vec<EnvVar>,
    },
    /// A hosted server reached over HTTP (SSE or streamable HTTP).
    Remote {
        url: String,
        url_description: String,
        http_headers: Vec<HttpHeader>,
    },
}

/// Launchers the tool-introspection sandbox knows how to start, in
/// descending order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Launcher {
    Npx,
    Uv,
    Docker,
}

impl Launcher {
    /// Classify a command by its program name (`/usr/bin/npx`, `uvx.exe`, ...).
    pub fn from_command(command: &str) -> Option<Self> {
        let program = command
            .trim()
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let program = program
            .strip_suffix(".exe")
            .or_else(|| program.strip_suffix(".cmd"))
            .unwrap_or(&program);

        match program {
            "npx" => Some(Self::Npx),
            "uv" | "uvx" => Some(Self::Uv),
            "docker" => Some(Self::Docker),
            _ => None,
        }
    }
}

/// One launch variant of a server, as extracted from its documentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawServerConfig", into = "RawServerConfig")]
pub struct ServerConfig {
    pub launch: Launch,
    pub preferred: bool,
}

impl ServerConfig {
    pub fn command(command: impl Into<String>, args: Vec<String>, env: Vec<EnvVar>) -> Self {
        Self {
            launch: Launch::Command {
                command: command.into(),
                args,
                env,
            },
            preferred: false,
        }
    }

    pub fn remote(url: impl Into<String>, url_description: impl Into<String>) -> Self {
        Self {
            launch: Launch::Remote {
                url: url.into(),
                url_description: url_description.into(),
                http_headers: Vec::new(),
            },
            preferred: false,
        }
    }

    /// The launcher family, for command-based configs only.
    pub fn launcher(&self) -> Option<Launcher> {
        match &self.launch {
            Launch::Command { command, .. } => Launcher::from_command(command),
            Launch::Remote { .. } => None,
        }
    }
}

/// Flat JSON form of a [`ServerConfig`], accepting whatever subset of
/// fields the producer filled in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawServerConfig {
    #[serde(default, deserialize_with = "nullable")]
    pub env: Vec<EnvVar>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub http_headers: Vec<HttpHeader>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub url_description: String,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "is_false")]
    pub preferred: bool,
}

impl TryFrom<RawServerConfig> for ServerConfig {
    type Error = ManifestError;

    fn try_from(raw: RawServerConfig) -> Result<Self, Self::Error> {
        let command = raw.command.trim();
        let url = raw.url.trim();

        let launch = if !command.is_empty() {
            Launch::Command {
                command: command.to_string(),
                args: raw.args,
                env: raw.env,
            }
        } else if !url.is_empty() {
            Launch::Remote {
                url: url.to_string(),
                url_description: raw.url_description,
                http_headers: raw.http_headers,
            }
        } else {
            return Err(ManifestError::EmptyLaunch);
        };

        Ok(Self {
            launch,
            preferred: raw.preferred,
        })
    }
}

impl From<ServerConfig> for RawServerConfig {
    fn from(config: ServerConfig) -> Self {
        match config.launch {
            Launch::Command { command, args, env } => RawServerConfig {
                env,
                command,
                args,
                preferred: config.preferred,
                ..Default::default()
            },
            Launch::Remote {
                url,
                url_description,
                http_headers,
            } => RawServerConfig {
                url,
                url_description,
                http_headers,
                preferred: config.preferred,
                ..Default::default()
            },
        }
    }
}

/// Mark exactly one config as preferred: the first `npx` launcher, else
/// the first `uv`/`uvx` launcher, else the first `docker` launcher.
///
/// Any `preferred` flag already present is cleared first, so at most one
/// entry carries the flag afterwards. Returns the index of the marked
/// config, if any.
pub fn select_preferred(configs: &mut [ServerConfig]) -> Option<usize> {
    for config in configs.iter_mut() {
        config.preferred = false;
    }

    let chosen = [Launcher::Npx, Launcher::Uv, Launcher::Docker]
        .into_iter()
        .find_map(|wanted| {
            configs
                .iter()
                .position(|c| c.launcher() == Some(wanted))
        })?;

    configs[chosen].preferred = true;
    Some(chosen)
}

/// An ordered list of server configs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(Vec<ServerConfig>);

impl Manifest {
    pub fn new(configs: Vec<ServerConfig>) -> Self {
        Self(configs)
    }

    pub fn configs(&self) -> &[ServerConfig] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The config marked preferred, if any.
    pub fn preferred(&self) -> Option<&ServerConfig> {
        self.0.iter().find(|c| c.preferred)
    }

    /// Run [`select_preferred`] over this manifest.
    pub fn mark_preferred(&mut self) -> Option<&ServerConfig> {
        let index = select_preferred(&mut self.0)?;
        self.0.get(index)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".to_string())
    }

    /// Decode a stored manifest column.
    ///
    /// `NULL`, empty text and the `{}` placeholder all mean "no manifest"
    /// and decode to an empty manifest.
    pub fn from_stored(text: Option<&str>) -> Result<Self, ManifestError> {
        let text = match text.map(str::trim) {
            None | Some("") | Some("{}") | Some("null") => return Ok(Self::default()),
            Some(t) => t,
        };
        Ok(serde_json::from_str(text)?)
    }
}

impl From<Vec<ServerConfig>> for Manifest {
    fn from(configs: Vec<ServerConfig>) -> Self {
        Self(configs)
    }
}

/// Where an analysis result is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestTarget {
    /// Overwrite the accepted manifest (and drop any pending proposal).
    Accepted,
    /// Stage as a proposal, leaving the accepted manifest untouched.
    Proposed,
}

impl std::fmt::Display for ManifestTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestTarget::Accepted => write!(f, "accepted"),
            ManifestTarget::Proposed => write!(f, "proposed"),
        }
    }
}

/// Review state of a record's manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ManifestState {
    /// Never successfully analyzed (or the accepted manifest was cleared).
    #[default]
    Absent,
    /// A curated manifest with nothing pending.
    Accepted(Manifest),
    /// A re-analysis result awaiting approval. `accepted` is what the
    /// catalog keeps serving until the proposal is approved.
    Proposed { accepted: Manifest, proposed: Manifest },
}

impl ManifestState {
    /// Rebuild the state from the two stored columns.
    pub fn from_parts(accepted: Manifest, proposed: Manifest) -> Self {
        match (accepted.is_empty(), proposed.is_empty()) {
            (_, false) => Self::Proposed { accepted, proposed },
            (false, true) => Self::Accepted(accepted),
            (true, true) => Self::Absent,
        }
    }

    /// The accepted manifest, when one with at least one config exists.
    pub fn accepted(&self) -> Option<&Manifest> {
        let accepted = match self {
            Self::Absent => None,
            Self::Accepted(m) => Some(m),
            Self::Proposed { accepted, .. } => Some(accepted),
        };
        accepted.filter(|m| !m.is_empty())
    }

    pub fn proposed(&self) -> Option<&Manifest> {
        match self {
            Self::Proposed { proposed, .. } => Some(proposed),
            _ => None,
        }
    }

    /// Decide where a fresh analysis goes: straight into the accepted
    /// manifest when none exists yet or when forced, otherwise into a
    /// proposal for review.
    pub fn target(&self, force: bool) -> ManifestTarget {
        if force || self.accepted().is_none() {
            ManifestTarget::Accepted
        } else {
            ManifestTarget::Proposed
        }
    }

    /// Write `manifest` to `target`.
    pub fn apply(self, target: ManifestTarget, manifest: Manifest) -> Self {
        match target {
            ManifestTarget::Accepted => Self::from_parts(manifest, Manifest::default()),
            ManifestTarget::Proposed => {
                let accepted = match self {
                    Self::Absent => Manifest::default(),
                    Self::Accepted(m) => m,
                    Self::Proposed { accepted, .. } => accepted,
                };
                Self::from_parts(accepted, manifest)
            }
        }
    }

    /// Promote the pending proposal to the accepted manifest.
    pub fn approve(self) -> Result<Self, ManifestError> {
        match self {
            Self::Proposed { proposed, .. } => Ok(Self::from_parts(proposed, Manifest::default())),
            _ => Err(ManifestError::NoPendingProposal),
        }
    }

    /// Column values for persistence: `(manifest, proposed_manifest)`.
    /// `None` is stored as SQL `NULL`.
    pub fn to_columns(&self) -> (Option<String>, Option<String>) {
        (
            self.accepted().map(Manifest::to_json),
            self.proposed().map(Manifest::to_json),
        )
    }

    /// Inverse of [`to_columns`](Self::to_columns).
    pub fn from_columns(
        manifest: Option<&str>,
        proposed: Option<&str>,
    ) -> Result<Self, ManifestError> {
        Ok(Self::from_parts(
            Manifest::from_stored(manifest)?,
            Manifest::from_stored(proposed)?,
        ))
    }
}
