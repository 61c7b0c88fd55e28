mod adapter;
mod device;
mod requests;
mod state_machine;
