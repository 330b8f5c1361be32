//! `TaskPtr` lives in [`crate::process::table`] now — it's obtained from
//! the thread table directly, so defining a second handle type here would
//! just invite the two to drift apart.

pub use crate::process::table::TaskPtr;
