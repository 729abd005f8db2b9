//! Image lifecycle steps: persist external images, sign owned ones for display,
//! accept direct uploads, prepare submissions, and reclaim orphans.

pub mod persist;
pub mod reclaim;
pub mod signed;
pub mod submit;
pub mod upload;
