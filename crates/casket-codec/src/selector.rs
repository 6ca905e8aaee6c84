//! Process-wide codec selection.

use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use crate::codec::{Codec, CompressionType};
use crate::error::Result;

#[derive(Debug)]
struct Selection {
    kind: CompressionType,
    codec: Option<Arc<dyn Codec>>,
}

/// Hands out one codec instance for the lifetime of the selector.
///
/// The first successful [`select`](Self::select) fixes the codec; concurrent
/// first callers all observe the same instance. Later requests for a
/// different compression type get the already-selected codec back.
#[derive(Debug, Default)]
pub struct CodecSelector {
    selected: OnceLock<Selection>,
}

impl CodecSelector {
    /// Create an empty selector.
    pub const fn new() -> Self {
        Self {
            selected: OnceLock::new(),
        }
    }

    /// Resolve `name` to the process codec, constructing it on first use.
    ///
    /// Returns `Ok(None)` when the selected type is `none`.
    pub fn select(&self, name: &str) -> Result<Option<Arc<dyn Codec>>> {
        let requested: CompressionType = name.parse()?;

        let selection = self.selected.get_or_init(|| {
            debug!(codec = %requested, "Selecting session payload codec");
            Selection {
                kind: requested,
                codec: requested.build(),
            }
        });

        if selection.kind != requested {
            warn!(
                selected = %selection.kind,
                requested = %requested,
                "Codec is fixed for the process lifetime, ignoring request"
            );
        }

        Ok(selection.codec.clone())
    }
}

/// The selector shared by every session store in this process.
pub fn global_selector() -> &'static CodecSelector {
    static GLOBAL: CodecSelector = CodecSelector::new();
    &GLOBAL
}
