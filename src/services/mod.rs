pub mod dispatcher;
pub mod encryption;
pub mod extraction;
pub mod intake;
pub mod memory;
pub mod notify;
pub mod queue;
pub mod retry;
pub mod shutdown;
pub mod storage;
pub mod store;
pub mod verification;
pub mod worker;
