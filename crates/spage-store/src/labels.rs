//! Pin label namespace
//!
//! The entire persistent state machine of the dservice lives in pin labels.
//! Five namespaces share the `spg_` prefix:
//!
//! - `spg_staged_<name>_<unix-seconds>` - upload not yet confirmed on chain
//! - `spg_final_<name>_<height>` - confirmed live version of a name
//! - `spg_list_<set-name>` - one element of a typed set
//! - `spg_finalizations` - the serialized finalization map
//! - `spg_latest_block_number` - last fully processed chain height
//!
//! Names match `^[a-z0-9-]+\.eth$` and therefore never contain `_`, so the
//! numeric suffix is always recoverable by splitting from the right.

/// Prefix for staged upload pins
pub const STAGED_PREFIX: &str = "spg_staged_";

/// Prefix for finalized version pins
pub const FINAL_PREFIX: &str = "spg_final_";

/// Prefix for typed set element pins
pub const LIST_PREFIX: &str = "spg_list_";

/// Label of the single finalization map pin
pub const FINALIZATIONS_LABEL: &str = "spg_finalizations";

/// Label of the single chain cursor pin
pub const LATEST_BLOCK_LABEL: &str = "spg_latest_block_number";

/// Label for a staged upload of `name` at `unix_seconds`
pub fn staged(name: &str, unix_seconds: u64) -> String {
    format!("{STAGED_PREFIX}{name}_{unix_seconds}")
}

/// Label for the finalized version of `name` at `height`
pub fn finalized(name: &str, height: u64) -> String {
    format!("{FINAL_PREFIX}{name}_{height}")
}

/// Label for one element of the set `set_name`
pub fn list(set_name: &str) -> String {
    format!("{LIST_PREFIX}{set_name}")
}

/// Prefix matching every staged pin of `name`
pub fn staged_prefix(name: &str) -> String {
    format!("{STAGED_PREFIX}{name}_")
}

/// Prefix matching every finalized pin of `name`
pub fn finalized_prefix(name: &str) -> String {
    format!("{FINAL_PREFIX}{name}_")
}

/// Parse `spg_staged_<name>_<ts>` into `(name, ts)`
pub fn parse_staged(label: &str) -> Option<(&str, u64)> {
    split_suffixed(label, STAGED_PREFIX)
}

/// Parse `spg_final_<name>_<height>` into `(name, height)`
pub fn parse_finalized(label: &str) -> Option<(&str, u64)> {
    split_suffixed(label, FINAL_PREFIX)
}

fn split_suffixed<'a>(label: &'a str, prefix: &str) -> Option<(&'a str, u64)> {
    let rest = label.strip_prefix(prefix)?;
    let (name, suffix) = rest.rsplit_once('_')?;
    let number = suffix.parse().ok()?;
    Some((name, number))
}
