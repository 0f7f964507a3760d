mod approvals;
mod exec;
mod patches;
