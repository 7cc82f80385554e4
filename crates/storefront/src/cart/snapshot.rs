//! Durable cart snapshot: wire format and storage backends.
//!
//! # Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "state": {
//!     "lines": [
//!       {"itemId": "p1", "name": "Pizza", "unitPrice": "10", "quantity": 2, "subtotal": "20"}
//!     ],
//!     "totalAmount": "20",
//!     "deliveryAddress": null
//!   }
//! }
//! ```
//!
//! Decimal amounts are strings so no precision is lost. Decoding validates
//! every invariant; anything that does not hold is reported as
//! [`SnapshotError::Corrupt`] and the caller falls back to an empty cart.

use std::cell::RefCell;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::state::{CartLine, CartLineInput, CartState};

/// Fixed logical key the cart is stored under.
pub const SNAPSHOT_KEY: &str = "cart-storage";

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Errors reading or writing a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Filesystem operation failed.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Snapshot is not valid JSON for the expected shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot was written by an unknown format version.
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    /// Snapshot parsed but violates a cart invariant.
    #[error("corrupt snapshot: {0}")]
    Corrupt(String),
}

impl SnapshotError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    state: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotState {
    lines: Vec<SnapshotLine>,
    total_amount: Decimal,
    delivery_address: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotLine {
    item_id: String,
    name: String,
    unit_price: Decimal,
    quantity: i64,
    subtotal: Decimal,
}

impl From<&CartLine> for SnapshotLine {
    fn from(line: &CartLine) -> Self {
        Self {
            item_id: line.item_id().to_string(),
            name: line.name().to_string(),
            unit_price: line.unit_price().amount(),
            quantity: i64::from(line.quantity().get()),
            subtotal: line.subtotal().amount(),
        }
    }
}

/// Serialize a cart state into the versioned snapshot format.
///
/// # Errors
///
/// Returns [`SnapshotError::Json`] if serialization fails.
pub fn encode_snapshot(state: &CartState) -> Result<String, SnapshotError> {
    let body = SnapshotState {
        lines: state.lines().iter().map(SnapshotLine::from).collect(),
        total_amount: state.total().amount(),
        delivery_address: state.delivery_address().map(str::to_owned),
    };
    let envelope = Envelope {
        version: SNAPSHOT_VERSION,
        state: serde_json::to_value(body)?,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Parse and validate a snapshot.
///
/// # Errors
///
/// Returns an error if the JSON is malformed, the version is unknown, or the
/// content violates a cart invariant (invalid line, repeated item ID, stored
/// subtotal or total that disagrees with the lines).
pub fn decode_snapshot(raw: &str) -> Result<CartState, SnapshotError> {
    let envelope: Envelope = serde_json::from_str(raw)?;
    if envelope.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(envelope.version));
    }
    let body: SnapshotState = serde_json::from_value(envelope.state)?;

    let mut lines: Vec<CartLine> = Vec::with_capacity(body.lines.len());
    for stored in body.lines {
        let line = CartLineInput {
            item_id: stored.item_id,
            name: stored.name,
            unit_price: stored.unit_price,
            quantity: stored.quantity,
        }
        .validate()
        .map_err(|e| SnapshotError::Corrupt(e.to_string()))?;

        if line.subtotal().amount() != stored.subtotal {
            return Err(SnapshotError::Corrupt(format!(
                "subtotal for {} is {}, expected {}",
                line.item_id(),
                stored.subtotal,
                line.subtotal().amount()
            )));
        }
        if lines.iter().any(|l| l.item_id() == line.item_id()) {
            return Err(SnapshotError::Corrupt(format!(
                "item {} appears more than once",
                line.item_id()
            )));
        }
        lines.push(line);
    }

    let address = body
        .delivery_address
        .filter(|address| !address.trim().is_empty());
    let state = CartState::from_parts(lines, address)
        .map_err(|e| SnapshotError::Corrupt(e.to_string()))?;

    if state.total().amount() != body.total_amount {
        return Err(SnapshotError::Corrupt(format!(
            "total is {}, lines add up to {}",
            body.total_amount,
            state.total().amount()
        )));
    }
    Ok(state)
}

/// Storage for the serialized cart.
///
/// Implementations hold exactly one snapshot, under [`SNAPSHOT_KEY`].
pub trait SnapshotStore {
    /// Read the stored snapshot, or `None` if nothing has been saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    fn load(&self) -> Result<Option<String>, SnapshotError>;

    /// Replace the stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be written.
    fn save(&self, raw: &str) -> Result<(), SnapshotError>;

    /// Remove the stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be written.
    fn clear(&self) -> Result<(), SnapshotError>;
}

/// Snapshot kept in a JSON file named after [`SNAPSHOT_KEY`].
///
/// Writes go to a sibling temp file which is then renamed over the real one,
/// so a crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    /// Store the snapshot at `<dir>/cart-storage.json`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(format!("{SNAPSHOT_KEY}.json")),
        }
    }

    /// Path of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<Option<String>, SnapshotError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SnapshotError::io(&self.path, e)),
        }
    }

    fn save(&self, raw: &str) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SnapshotError::io(parent, e))?;
        }
        let temp = self.temp_path();
        std::fs::write(&temp, raw).map_err(|e| SnapshotError::io(&temp, e))?;
        std::fs::rename(&temp, &self.path).map_err(|e| SnapshotError::io(&self.path, e))
    }

    fn clear(&self) -> Result<(), SnapshotError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SnapshotError::io(&self.path, e)),
        }
    }
}

/// In-process snapshot buffer.
///
/// Clones share the same buffer, so a second store opened from a clone sees
/// what the first one saved (a restart, without the filesystem).
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    slot: Rc<RefCell<Option<String>>>,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed the buffer with raw snapshot text.
    #[must_use]
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            slot: Rc::new(RefCell::new(Some(raw.into()))),
        }
    }

    /// Current raw snapshot text.
    #[must_use]
    pub fn raw(&self) -> Option<String> {
        self.slot.borrow().clone()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<String>, SnapshotError> {
        Ok(self.raw())
    }

    fn save(&self, raw: &str) -> Result<(), SnapshotError> {
        *self.slot.borrow_mut() = Some(raw.to_owned());
        Ok(())
    }

    fn clear(&self) -> Result<(), SnapshotError> {
        *self.slot.borrow_mut() = None;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::dec;
    use takeout_core::{FoodId, Price, Quantity};

    use super::*;

    fn sample_state() -> CartState {
        let lines = vec![
            CartLine::new(
                FoodId::parse("p1").unwrap(),
                "Pizza".to_string(),
                Price::new(dec!(10)).unwrap(),
                Quantity::try_from(2_i64).unwrap(),
            )
            .unwrap(),
            CartLine::new(
                FoodId::parse("p2").unwrap(),
                "Salad".to_string(),
                Price::new(dec!(4.75)).unwrap(),
                Quantity::ONE,
            )
            .unwrap(),
        ];
        CartState::from_parts(lines, Some("1 Main St".to_string())).unwrap()
    }

    #[test]
    fn test_encoded_snapshot_uses_documented_keys() {
        let raw = encode_snapshot(&sample_state()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(value["version"], 1);
        assert_eq!(value["state"]["totalAmount"], "24.75");
        assert_eq!(value["state"]["deliveryAddress"], "1 Main St");
        assert_eq!(value["state"]["lines"][0]["itemId"], "p1");
        assert_eq!(value["state"]["lines"][0]["subtotal"], "20");
        assert_eq!(value["state"]["lines"][1]["unitPrice"], "4.75");
    }

    #[test]
    fn test_decode_restores_identical_state() {
        let state = sample_state();
        let decoded = decode_snapshot(&encode_snapshot(&state).unwrap()).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let raw = r#"{"version": 7, "state": {}}"#;
        assert!(matches!(
            decode_snapshot(raw),
            Err(SnapshotError::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_snapshot("not json"),
            Err(SnapshotError::Json(_))
        ));
    }

    #[test]
    fn test_decode_rejects_drifted_total() {
        let raw = r#"{"version":1,"state":{"lines":[
            {"itemId":"p1","name":"Pizza","unitPrice":"10","quantity":2,"subtotal":"20"}
        ],"totalAmount":"30","deliveryAddress":null}}"#;
        assert!(matches!(decode_snapshot(raw), Err(SnapshotError::Corrupt(_))));
    }

    #[test]
    fn test_decode_rejects_wrong_subtotal() {
        let raw = r#"{"version":1,"state":{"lines":[
            {"itemId":"p1","name":"Pizza","unitPrice":"10","quantity":2,"subtotal":"10"}
        ],"totalAmount":"10","deliveryAddress":null}}"#;
        assert!(matches!(decode_snapshot(raw), Err(SnapshotError::Corrupt(_))));
    }

    #[test]
    fn test_decode_rejects_duplicate_items() {
        let raw = r#"{"version":1,"state":{"lines":[
            {"itemId":"p1","name":"Pizza","unitPrice":"10","quantity":1,"subtotal":"10"},
            {"itemId":"p1","name":"Pizza","unitPrice":"10","quantity":1,"subtotal":"10"}
        ],"totalAmount":"20","deliveryAddress":null}}"#;
        assert!(matches!(decode_snapshot(raw), Err(SnapshotError::Corrupt(_))));
    }

    #[test]
    fn test_decode_rejects_zero_quantity() {
        let raw = r#"{"version":1,"state":{"lines":[
            {"itemId":"p1","name":"Pizza","unitPrice":"10","quantity":0,"subtotal":"0"}
        ],"totalAmount":"0","deliveryAddress":null}}"#;
        assert!(matches!(decode_snapshot(raw), Err(SnapshotError::Corrupt(_))));
    }

    #[test]
    fn test_decode_rejects_amounts_too_large_to_total() {
        // 79228162514264337593543950335 is the largest representable decimal.
        let line_overflow = r#"{"version":1,"state":{"lines":[
            {"itemId":"p1","name":"Gold","unitPrice":"79228162514264337593543950335","quantity":2,"subtotal":"0"}
        ],"totalAmount":"0","deliveryAddress":null}}"#;
        assert!(matches!(
            decode_snapshot(line_overflow),
            Err(SnapshotError::Corrupt(_))
        ));

        let total_overflow = r#"{"version":1,"state":{"lines":[
            {"itemId":"a","name":"Gold","unitPrice":"79228162514264337593543950335","quantity":1,"subtotal":"79228162514264337593543950335"},
            {"itemId":"b","name":"Gold","unitPrice":"79228162514264337593543950335","quantity":1,"subtotal":"79228162514264337593543950335"}
        ],"totalAmount":"0","deliveryAddress":null}}"#;
        assert!(matches!(
            decode_snapshot(total_overflow),
            Err(SnapshotError::Corrupt(_))
        ));
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::in_dir(&dir.path().join("nested"));

        assert_eq!(store.load().unwrap(), None);
        store.save("{\"hello\":1}").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("{\"hello\":1}"));
        assert!(store.path().ends_with("cart-storage.json"));
        assert!(!store.temp_path().exists());

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        // Clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_memory_store_clones_share_buffer() {
        let store = MemorySnapshotStore::new();
        let other = store.clone();
        store.save("abc").unwrap();
        assert_eq!(other.load().unwrap().as_deref(), Some("abc"));
    }
}
