pub mod cmd;
pub mod logger;
pub mod shutdown;
