//! Stored entity states.
//!
//! A state captures the persistent part of an entity after a run: its io
//! payloads, extracts, common settings and type-specific properties. States
//! live at `<entity>/states/<model>/<runname>/state.bin`. Parallel run
//! plumbing, load settings, io files and transient properties are never
//! stored.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use fnv::FnvHashMap;

use crate::bundle::Bundle;
use crate::entity::{Core, Entity};
use crate::error::{Error, Result};
use crate::logger::Level;
use crate::model::SimModel;
use crate::util;
use crate::var::Var;

/// Name of the file holding the encoded state inside a state directory.
pub const STATE_FILE_NAME: &str = "state.bin";

/// Current state format version.
pub const STATE_VERSION: u32 = 1;

/// Selectors resolving to the most recently modified stored state.
pub static LATEST_SELECTORS: &[&str; 2] = &["latest", "last"];

/// Representation of an entity's persistent state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub version: u32,
    pub metadata: StateMetadata,
    pub core: CoreState,
    /// Io payloads by io name
    pub ios: FnvHashMap<String, Var>,
    pub extracts: Bundle<Var>,
    /// Type-specific properties, transient ones excluded
    pub fields: FnvHashMap<String, Var>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMetadata {
    pub created: DateTime<Utc>,
    pub kind: String,
}

/// Stored subset of the common entity settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreState {
    pub model: Option<SimModel>,
    pub runname: String,
    pub debug: bool,
    pub print_relative_path: bool,
    pub print_colors: bool,
    pub preserve_iofiles: bool,
    pub save_state: bool,
}

impl State {
    /// Captures the current state of an entity.
    pub fn capture<E: Entity>(entity: &E) -> Self {
        let core = entity.core();
        let ios = core
            .ios
            .iter()
            .map(|(name, io)| (name.clone(), io.data().clone()))
            .collect();
        let transient = entity.transient_fields();
        let mut fields = FnvHashMap::default();
        for name in entity.fields() {
            if transient.contains(name) {
                continue;
            }
            if let Some(val) = entity.get_field(name) {
                fields.insert(name.to_string(), val);
            }
        }
        State {
            version: STATE_VERSION,
            metadata: StateMetadata {
                created: Utc::now(),
                kind: E::KIND.to_string(),
            },
            core: core.to_state(),
            ios,
            extracts: core.extracts.clone(),
            fields,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let data: Vec<u8> =
            bincode::serialize(&self).map_err(|e| Error::FailedCreatingSnapshot(e.to_string()))?;
        #[cfg(feature = "lz4")]
        {
            Ok(lz4::block::compress(&data, None, true)?)
        }
        #[cfg(not(feature = "lz4"))]
        {
            Ok(data)
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        #[cfg(feature = "lz4")]
        let data = lz4::block::decompress(bytes, None)
            .map_err(|e| Error::SnapshotDecompressionError(e.to_string()))?;
        #[cfg(not(feature = "lz4"))]
        let data = bytes;
        let state: State = bincode::deserialize(&data)
            .map_err(|e| Error::FailedReadingSnapshot(e.to_string()))?;
        if state.version > STATE_VERSION {
            return Err(Error::UnsupportedSnapshotVersion(state.version));
        }
        Ok(state)
    }

    /// Applies the state to an entity.
    ///
    /// Io payloads only go into ios the entity already has. Extracts always
    /// replace the current ones. Settings and type-specific properties are
    /// applied only if `full` is set.
    pub fn apply<E: Entity>(self, entity: &mut E, full: bool) {
        for (name, payload) in self.ios {
            if !entity.core().ios.contains(&name) {
                entity.core().log(
                    Level::Debug,
                    &format!("Skipping stored data of unknown io {}", name),
                );
                continue;
            }
            if let Some(io) = entity.core_mut().ios.get_mut(&name) {
                io.set_data(payload);
            }
        }
        entity.core_mut().extracts = self.extracts;

        if !full {
            return;
        }
        entity.core_mut().apply_state(self.core);
        let transient = entity.transient_fields();
        for (name, val) in self.fields {
            if transient.contains(&name.as_str()) || !entity.fields().contains(&name.as_str()) {
                entity
                    .core()
                    .log(Level::Debug, &format!("Skipping stored property {}", name));
                continue;
            }
            if let Err(e) = entity.set_field(&name, val) {
                entity.core().log(
                    Level::Error,
                    &format!("Failed restoring property {}: {}", name, e),
                );
            }
        }
    }
}

/// Stores the entity's state in its state directory.
///
/// Failing to write is reported and otherwise ignored. Only an unset model
/// makes this fail. An existing state is never overwritten.
pub fn write_state<E: Entity>(entity: &E) -> Result<()> {
    let core = entity.core();
    let dir = core.statedir()?;
    let file = dir.join(STATE_FILE_NAME);
    if file.exists() {
        core.log(
            Level::Error,
            &format!("State already exists in {}, not overwriting", dir.display()),
        );
        return Ok(());
    }
    if let Err(e) = fs::create_dir_all(&dir) {
        core.log(
            Level::Error,
            &format!("Failed to create {}: {}", dir.display(), e),
        );
        return Ok(());
    }
    core.log(Level::Info, &format!("Saving state to {}", dir.display()));
    let res = State::capture(entity)
        .to_bytes()
        .and_then(|bytes| fs::write(&file, bytes).map_err(Error::from));
    if let Err(e) = res {
        core.log(Level::Error, &format!("{}", e));
        core.log(
            Level::Error,
            &format!("Failed saving state to {}", dir.display()),
        );
    }
    Ok(())
}

/// Restores a stored state into the entity.
///
/// The selector is a run name, or one of [`LATEST_SELECTORS`]. If the
/// state can't be found the available runs are listed. That is fatal when
/// `load_state_full` is set, otherwise nothing is loaded and `false` is
/// returned.
pub fn read_state<E: Entity>(entity: &mut E, selector: &str) -> Result<bool> {
    let core = entity.core();
    let statepath = core.statepath()?;
    let runname = resolve_selector(&statepath, selector);
    let dir = statepath.join(&runname);
    if !dir.join(STATE_FILE_NAME).is_file() {
        core.log(
            Level::Error,
            &format!("Existing results not found in {}", dir.display()),
        );
        core.log(Level::Info, "Found results:");
        for name in list_states(core)? {
            core.log(Level::Info, &name);
        }
        if core.load_state_full {
            return Err(core.fatal(&format!("Failed loading state from {}", dir.display())));
        }
        return Ok(false);
    }

    core.log(Level::Info, &format!("Loading state from {}", dir.display()));
    let state = match fs::read(dir.join(STATE_FILE_NAME))
        .map_err(Error::from)
        .and_then(|bytes| State::from_bytes(&bytes))
    {
        Ok(s) => s,
        Err(e) => {
            return Err(core.fatal(&format!(
                "Failed loading state from {}: {}",
                dir.display(),
                e
            )))
        }
    };
    if state.metadata.kind != E::KIND {
        core.log(
            Level::Warning,
            &format!(
                "Loading state stored by {} into {}",
                state.metadata.kind,
                E::KIND
            ),
        );
    }
    let full = core.load_state_full;
    state.apply(entity, full);
    Ok(true)
}

/// Lists run names of the stored states available to the entity.
pub fn list_states(core: &Core) -> Result<Vec<String>> {
    Ok(util::get_top_dirs_at(&core.statepath()?)
        .iter()
        .filter(|p| p.join(STATE_FILE_NAME).is_file())
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .collect())
}

fn resolve_selector(statepath: &Path, selector: &str) -> String {
    if LATEST_SELECTORS.contains(&selector) {
        if let Some(latest) = util::get_latest_dir_at(statepath) {
            if let Some(name) = latest.file_name() {
                return name.to_string_lossy().to_string();
            }
        }
    }
    selector.to_string()
}
