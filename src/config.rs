use tinyvec::ArrayVec;

use crate::message::CipherSuite;
use crate::Error;

/// TLS client configuration
#[derive(Clone, Debug)]
pub struct Config {
    recv_poll_limit: usize,
    cipher_suites: ArrayVec<[CipherSuite; 8]>,
    verify_server_finished: bool,
    verify_record_mac: bool,
    rng_seed: Option<u64>,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            recv_poll_limit: 1_000_000,
            cipher_suites: CipherSuite::all(),
            verify_server_finished: true,
            verify_record_mac: true,
            rng_seed: None,
        }
    }

    /// Max number of transport polls while waiting for one record.
    ///
    /// Running out fails the operation with [`Error::Timeout`].
    #[inline(always)]
    pub fn recv_poll_limit(&self) -> usize {
        self.recv_poll_limit
    }

    /// Cipher suites offered in ClientHello, in preference order.
    #[inline(always)]
    pub fn cipher_suites(&self) -> &[CipherSuite] {
        &self.cipher_suites
    }

    /// Whether the server's Finished is decrypted and its verify_data checked.
    #[inline(always)]
    pub fn verify_server_finished(&self) -> bool {
        self.verify_server_finished
    }

    /// Whether the MAC of incoming CBC records is checked.
    ///
    /// GCM tags are always checked.
    #[inline(always)]
    pub fn verify_record_mac(&self) -> bool {
        self.verify_record_mac
    }

    /// Seed for the random number generator.
    ///
    /// `None` seeds from the operating system.
    #[inline(always)]
    pub fn rng_seed(&self) -> Option<u64> {
        self.rng_seed
    }
}

/// Builder for TLS client configuration.
pub struct ConfigBuilder {
    recv_poll_limit: usize,
    cipher_suites: ArrayVec<[CipherSuite; 8]>,
    verify_server_finished: bool,
    verify_record_mac: bool,
    rng_seed: Option<u64>,
}

impl ConfigBuilder {
    /// Set the max number of transport polls while waiting for one record.
    ///
    /// Defaults to 1,000,000.
    pub fn recv_poll_limit(mut self, limit: usize) -> Self {
        self.recv_poll_limit = limit;
        self
    }

    /// Set the cipher suites to offer, in preference order.
    ///
    /// Defaults to GCM then CBC.
    pub fn cipher_suites(mut self, suites: &[CipherSuite]) -> Self {
        self.cipher_suites.clear();
        for suite in suites {
            if self.cipher_suites.try_push(*suite).is_some() {
                break;
            }
        }
        self
    }

    /// Set whether the server's Finished message is verified.
    ///
    /// Defaults to true.
    pub fn verify_server_finished(mut self, verify: bool) -> Self {
        self.verify_server_finished = verify;
        self
    }

    /// Set whether incoming CBC record MACs are verified.
    ///
    /// Defaults to true.
    pub fn verify_record_mac(mut self, verify: bool) -> Self {
        self.verify_record_mac = verify;
        self
    }

    /// Seed the random number generator for reproducible output.
    ///
    /// Never use this outside of tests. Defaults to none.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Build the configuration.
    ///
    /// Returns [`Error::UnsupportedCipherSuite`] if a suite is not one this
    /// crate implements, and [`Error::CryptoError`] if none are configured.
    pub fn build(self) -> Result<Config, Error> {
        if self.cipher_suites.is_empty() {
            return Err(Error::CryptoError("no cipher suites configured".into()));
        }
        if let Some(bad) = self.cipher_suites.iter().find(|s| !s.is_supported()) {
            return Err(Error::UnsupportedCipherSuite(bad.as_u16()));
        }
        let recv_poll_limit = self.recv_poll_limit.max(1);

        Ok(Config {
            recv_poll_limit,
            cipher_suites: self.cipher_suites,
            verify_server_finished: self.verify_server_finished,
            verify_record_mac: self.verify_record_mac,
            rng_seed: self.rng_seed,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            recv_poll_limit: 1_000_000,
            cipher_suites: CipherSuite::all(),
            verify_server_finished: true,
            verify_record_mac: true,
            rng_seed: None,
        }
    }
}
