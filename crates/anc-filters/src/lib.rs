//! Adaptive filter bank (C5): NLMS, RLS, and a Hybrid blend, each guarded
//! by the same safety gate, wrapped in a multi-channel bank with ANCF
//! persistence.

#![deny(unsafe_code)]

mod common;
mod error;
mod filter_bank;
mod hybrid;
mod nlms;
mod persistence;
mod rls;
mod tap_line;

pub use common::{AdaptiveFilter, ProcessReport, SampleOutput, DEFAULT_MAX_CONSECUTIVE_ROLLBACKS, DEFAULT_W_MAX_SQ};
pub use error::{Error, Result};
pub use filter_bank::{Algorithm, ChannelReport, FilterBank};
pub use hybrid::{Hybrid, HybridConfig, ALPHA_MAX, ALPHA_MIN, ALPHA_STEP};
pub use nlms::{Nlms, NlmsConfig};
pub use persistence::{
    restore_hybrid, restore_nlms, restore_rls, snapshot_hybrid, snapshot_nlms, snapshot_rls, FilterSnapshot,
};
pub use rls::{Rls, RlsConfig};
