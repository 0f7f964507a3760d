pub mod is_dangerous_command;
pub mod is_safe_command;
pub mod risk;
mod windows_dangerous_commands;

pub use risk::RiskAssessment;
pub use risk::RiskRule;
pub use risk::RiskRules;
pub use risk::RiskRulesError;
