pub mod decrypt;
pub mod encrypt;
pub mod fingerprint;
pub mod fl;
pub mod init;
pub mod keygen;
mod manifest;
pub mod version;

pub use decrypt::Decrypt;
pub use encrypt::Encrypt;
pub use fingerprint::Fingerprint;
pub use fl::Fl;
pub use init::Init;
pub use keygen::Keygen;
pub use version::Version;
