//! Keyed information store
//!
//! An [`Information`] maps interned [`Key`]s to typed [`InfoValue`]s. Stores
//! carry pipeline metadata (extents, piece requests, data types, data
//! objects) between algorithms and executives without either side knowing
//! the other's concrete type.

mod key;
mod store;
mod value;

pub use key::{Key, KeyKind};
pub use store::{Information, InformationVector};
pub use value::InfoValue;
