//! Session description rewriting
//!
//! Pure text transformations applied to a locally generated answer before it
//! is committed and sent back to the browser:
//! - direction downgrade (`a=sendrecv` → `a=sendonly`), the bridge never
//!   receives media
//! - bandwidth ceiling injection for every video media section

pub mod transform;

pub use transform::{force_send_only, BandwidthLimit, SdpTransformer};
