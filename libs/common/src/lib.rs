pub mod accrual;
pub mod id;
pub mod rank;
pub mod reconcile;

pub use accrual::AccrualRecord;
pub use id::{GroupId, Identity, SessionHandle};
pub use rank::{Rank, RankCalculator, RankStatus};
pub use reconcile::{GroupDiff, GroupReconciler};
