//! Infrastructure layer: driver error mapping, migration ledger access and
//! application state assembly.

pub mod db_errors;
pub mod migration_state;
pub mod state;
