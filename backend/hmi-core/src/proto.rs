// Transaction envelope shared with the adapters (package: hmi.transaction)
// Contains: TransactionMessage and its Action enumeration
pub mod transaction {
    include!(concat!(env!("OUT_DIR"), "/hmi.transaction.rs"));
}

pub use transaction::transaction_message::Action;
