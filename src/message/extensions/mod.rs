pub mod server_name;
pub mod signature_algorithms;

pub use server_name::ServerNameExtension;
pub use signature_algorithms::SignatureAlgorithmsExtension;
