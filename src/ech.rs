//! Encrypted Client Hello configuration builder.
//!
//! Produces wire-format `ECHConfig` / `ECHConfigList` blobs per
//! draft-ietf-tls-esni-18 so a TLS 1.3 stack can offer ECH against the
//! server's outer public name. The substantive TLS handling (HPKE opening,
//! inner hello reconstruction) belongs to the TLS library consuming these
//! blobs; this module only generates keys and serializes configuration.

use bytes::{BufMut, BytesMut};
use zeroize::Zeroizing;

use crate::crypto::{generate_keypair, PUBLIC_KEY_SIZE};
use crate::error::{Error, Result};

/// ECH version tag for draft-ietf-tls-esni-18.
const ECH_VERSION_DRAFT: u16 = 0xfe0d;

/// HPKE KEM: DHKEM(X25519, HKDF-SHA256).
const KEM_X25519: u16 = 0x0020;

/// HPKE KDF: HKDF-SHA256.
const KDF_HKDF_SHA256: u16 = 0x0001;

/// HPKE AEAD: AES-128-GCM.
const AEAD_AES128_GCM: u16 = 0x0001;

/// HPKE AEAD: ChaCha20-Poly1305.
const AEAD_CHACHA20: u16 = 0x0003;

/// A generated ECH config and its private key, suitable for configuring a
/// TLS server that supports Encrypted Client Hello.
pub struct EchKeySet {
    /// Identifier echoed by clients selecting this config
    pub config_id: u8,
    /// Outer SNI visible to observers
    pub public_name: String,
    /// X25519 private key seed
    pub private_key: Zeroizing<[u8; PUBLIC_KEY_SIZE]>,
    /// Serialized `ECHConfig`
    pub config: Vec<u8>,
}

/// Generate a fresh X25519-based ECH key set and serialized `ECHConfig`.
pub fn generate_ech_key_set(config_id: u8, public_name: &str) -> Result<EchKeySet> {
    if public_name.len() > u8::MAX as usize {
        return Err(Error::config("ECH public name too long"));
    }

    let (private_key, public_key) = generate_keypair();
    let config = marshal_ech_config(config_id, public_name, &public_key);

    Ok(EchKeySet {
        config_id,
        public_name: public_name.to_string(),
        private_key,
        config,
    })
}

/// Build a wire-format `ECHConfig`.
fn marshal_ech_config(config_id: u8, public_name: &str, public_key: &[u8]) -> Vec<u8> {
    let mut body = BytesMut::with_capacity(96);
    body.put_u8(config_id);
    body.put_u16(KEM_X25519);
    // Public key (length-prefixed)
    body.put_u16(public_key.len() as u16);
    body.put_slice(public_key);
    // Cipher suites (length-prefixed list of KDF/AEAD pairs)
    body.put_u16(8);
    body.put_u16(KDF_HKDF_SHA256);
    body.put_u16(AEAD_AES128_GCM);
    body.put_u16(KDF_HKDF_SHA256);
    body.put_u16(AEAD_CHACHA20);
    // Maximum name length
    body.put_u8(0);
    // Public name (length-prefixed)
    body.put_u8(public_name.len() as u8);
    body.put_slice(public_name.as_bytes());
    // Extensions (empty)
    body.put_u16(0);

    let mut config = BytesMut::with_capacity(4 + body.len());
    config.put_u16(ECH_VERSION_DRAFT);
    config.put_u16(body.len() as u16);
    config.put_slice(&body);
    config.to_vec()
}

/// Wrap one or more serialized `ECHConfig`s into an `ECHConfigList`.
pub fn marshal_ech_config_list<'a>(configs: impl IntoIterator<Item = &'a [u8]>) -> Vec<u8> {
    let mut list = BytesMut::new();
    for config in configs {
        list.put_slice(config);
    }

    let mut out = BytesMut::with_capacity(2 + list.len());
    out.put_u16(list.len() as u16);
    out.put_slice(&list);
    out.to_vec()
}

/// Complete server-side ECH configuration for a Reflex inbound.
pub struct EchServerKeys {
    /// Generated key set
    pub key_set: EchKeySet,
    /// Serialized `ECHConfigList` for client distribution
    pub config_list: Vec<u8>,
}

/// Generate a complete ECH configuration, including keypair and config list.
pub fn new_server_ech(public_name: &str, config_id: u8) -> Result<EchServerKeys> {
    let key_set = generate_ech_key_set(config_id, public_name)?;
    let config_list = marshal_ech_config_list([key_set.config.as_slice()]);
    Ok(EchServerKeys {
        key_set,
        config_list,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u16(data: &[u8], at: usize) -> u16 {
        u16::from_be_bytes([data[at], data[at + 1]])
    }

    #[test]
    fn test_ech_config_layout() {
        let ks = generate_ech_key_set(7, "cloudflare.com").unwrap();
        let cfg = &ks.config;

        // Version and body length
        assert_eq!(read_u16(cfg, 0), ECH_VERSION_DRAFT);
        let body_len = read_u16(cfg, 2) as usize;
        assert_eq!(cfg.len(), 4 + body_len);

        // Body: config_id, KEM, key length, key
        assert_eq!(cfg[4], 7);
        assert_eq!(read_u16(cfg, 5), KEM_X25519);
        assert_eq!(read_u16(cfg, 7) as usize, PUBLIC_KEY_SIZE);

        let after_key = 9 + PUBLIC_KEY_SIZE;

        // Suite list: two KDF/AEAD pairs
        assert_eq!(read_u16(cfg, after_key), 8);
        assert_eq!(read_u16(cfg, after_key + 2), KDF_HKDF_SHA256);
        assert_eq!(read_u16(cfg, after_key + 4), AEAD_AES128_GCM);
        assert_eq!(read_u16(cfg, after_key + 6), KDF_HKDF_SHA256);
        assert_eq!(read_u16(cfg, after_key + 8), AEAD_CHACHA20);

        // Max name length, then the public name
        let name_at = after_key + 10;
        assert_eq!(cfg[name_at], 0);
        assert_eq!(cfg[name_at + 1] as usize, "cloudflare.com".len());
        assert_eq!(
            &cfg[name_at + 2..name_at + 2 + "cloudflare.com".len()],
            b"cloudflare.com"
        );

        // Empty extensions close the body
        let ext_at = name_at + 2 + "cloudflare.com".len();
        assert_eq!(read_u16(cfg, ext_at), 0);
        assert_eq!(ext_at + 2, cfg.len());
    }

    #[test]
    fn test_config_list_wraps_configs() {
        let ks1 = generate_ech_key_set(1, "a.example").unwrap();
        let ks2 = generate_ech_key_set(2, "b.example").unwrap();

        let list = marshal_ech_config_list([ks1.config.as_slice(), ks2.config.as_slice()]);

        let inner_len = read_u16(&list, 0) as usize;
        assert_eq!(inner_len, ks1.config.len() + ks2.config.len());
        assert_eq!(list.len(), 2 + inner_len);
        assert_eq!(&list[2..2 + ks1.config.len()], ks1.config.as_slice());
        assert_eq!(&list[2 + ks1.config.len()..], ks2.config.as_slice());
    }

    #[test]
    fn test_new_server_ech() {
        let server = new_server_ech("cloudflare.com", 1).unwrap();
        assert_eq!(server.key_set.config_id, 1);
        assert_eq!(server.key_set.public_name, "cloudflare.com");

        let inner_len = read_u16(&server.config_list, 0) as usize;
        assert_eq!(inner_len, server.key_set.config.len());
    }

    #[test]
    fn test_oversized_public_name_rejected() {
        let name = "x".repeat(300);
        assert!(generate_ech_key_set(1, &name).is_err());
    }

    #[test]
    fn test_fresh_keys_per_set() {
        let ks1 = generate_ech_key_set(1, "example.com").unwrap();
        let ks2 = generate_ech_key_set(1, "example.com").unwrap();
        assert_ne!(*ks1.private_key, *ks2.private_key);
        assert_ne!(ks1.config, ks2.config);
    }
}
