//! schoolsync core data model.
//!
//! Plain, immutable data describing what a session subscribes to:
//! [`SubscriptionConfig`], [`RoleSubscriptionProfile`], [`RowFilter`] and
//! [`QueryKey`], plus the pure role profile builders in [`profiles`].
//!
//! Nothing in this crate performs I/O. The realtime worker lives in
//! `schoolsync-realtime`.

pub mod error;
pub mod filter;
pub mod identity;
pub mod profiles;
pub mod query_key;
pub mod subscription;
pub mod tables;

pub use error::{ProfileError, ProfileResult};
pub use filter::RowFilter;
pub use identity::{Role, SessionIdentity};
pub use profiles::{
    build_admin_profile, build_parent_profile, build_profile, build_student_profile,
    build_teacher_profile, DEFAULT_DEBOUNCE_MS, STUDENT_DEBOUNCE_MS,
};
pub use query_key::QueryKey;
pub use subscription::{ChangeKind, RoleSubscriptionProfile, SubscriptionConfig};
