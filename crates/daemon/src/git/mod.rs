// Git: subprocess worker, the content exporter built on it, and the
// migration of legacy `git_url` settings into bindings.

pub mod exporter;
pub mod migrate;
pub mod worker;
