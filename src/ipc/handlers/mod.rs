pub mod core;
pub mod drafts;
pub mod publish;
pub mod results;
