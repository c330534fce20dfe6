pub mod donate;
pub mod webhooks;
