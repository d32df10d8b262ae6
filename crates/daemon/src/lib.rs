// courier-daemon: event dispatch, deferred sync tasks and the HTTP API
// behind `courierd`.

pub mod bus;
pub mod clients;
pub mod config;
pub mod content;
pub mod dispatch;
pub mod export;
pub mod git;
pub mod http;
pub mod queue;
pub mod runtime;
pub mod store;
pub mod tasks;
pub mod uow;
pub mod worker;
