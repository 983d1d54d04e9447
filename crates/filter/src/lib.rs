mod constraints;
mod pool;
pub mod predicates;

pub use constraints::{ConstraintContext, ConstraintResolver, UserProfile};
pub use pool::{
    candidate_pool_id, summarize, CandidateMealDetail, CandidatePool, CandidatePoolFilter,
    PoolLimits, DEFAULT_MAX_SKUS, DEFAULT_POOL_LIMIT, MAX_POOL_LIMIT,
};
pub use predicates::RejectReason;
