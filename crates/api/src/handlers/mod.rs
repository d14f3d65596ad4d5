pub mod credits;
pub mod generations;
pub mod quota;
pub mod webhooks;
