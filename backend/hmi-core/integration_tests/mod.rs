mod channel;
mod helpers;
mod session;
