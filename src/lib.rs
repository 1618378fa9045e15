pub mod agent;
pub mod apps;
pub mod channel;
pub mod config;
pub mod flow;
pub mod guide;
pub mod health;
pub mod logger;
pub mod supervisor;
