mod common;
mod data;
mod edge;
mod handshake;
