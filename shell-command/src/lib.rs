//! Command parsing, platform adaptation and risk classification shared by
//! the Warden crates.

pub mod bash;
pub mod command_adapter;
pub mod command_safety;
pub mod shell;

pub use command_adapter::HostPlatform;
pub use command_adapter::adapt_command;
pub use command_adapter::adapt_command_for;
pub use command_safety::RiskAssessment;
pub use command_safety::RiskRule;
pub use command_safety::RiskRules;
pub use command_safety::RiskRulesError;
pub use command_safety::is_dangerous_command;
pub use command_safety::is_safe_command;
