// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builder for signed extension packages.
//!
//! Packages are signed independently of the code under test: the signature
//! covers `sha256(extension.toml) || sha256(module)`.

use std::io::Write;

use ed25519_dalek::{Signer, SigningKey};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Seed of the key trusted by default in tests.
pub const TEST_SIGNING_SEED: [u8; 32] = [7u8; 32];

pub fn test_signing_key() -> SigningKey {
    SigningKey::from_bytes(&TEST_SIGNING_SEED)
}

/// Hex of the default test public key, as it appears in `trusted_keys`.
pub fn test_public_key_hex() -> String {
    hex::encode(test_signing_key().verifying_key().to_bytes())
}

#[derive(Serialize)]
struct Manifest<'a> {
    pkg: &'a str,
    name: &'a str,
    version_name: &'a str,
    version_code: i64,
    lang: &'a str,
    nsfw: bool,
    entry_point: &'a str,
    features: &'a [String],
}

#[derive(Serialize)]
struct SignatureFile {
    public_key: String,
    signature: String,
}

pub struct ArtifactBuilder {
    pkg: String,
    name: String,
    version_code: i64,
    version_name: String,
    lang: String,
    nsfw: bool,
    entry_point: String,
    features: Vec<String>,
    module_text: String,
    binary: bool,
    signing_seed: Option<[u8; 32]>,
    tampered_module: Option<String>,
}

impl ArtifactBuilder {
    /// A signed package for `pkg` at version `1.4.{version_code}`.
    pub fn new(pkg: &str, version_code: i64, module_wat: &str) -> Self {
        Self {
            pkg: pkg.to_string(),
            name: format!("Name {pkg}"),
            version_code,
            version_name: format!("1.4.{version_code}"),
            lang: "en".into(),
            nsfw: false,
            entry_point: "tome_entry".into(),
            features: vec!["tome.extension".into()],
            module_text: module_wat.to_string(),
            binary: false,
            signing_seed: Some(TEST_SIGNING_SEED),
            tampered_module: None,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn version_name(mut self, version_name: &str) -> Self {
        self.version_name = version_name.to_string();
        self
    }

    pub fn entry_point(mut self, entry_point: &str) -> Self {
        self.entry_point = entry_point.to_string();
        self
    }

    pub fn features(mut self, features: &[&str]) -> Self {
        self.features = features.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn module_text(mut self, text: &str) -> Self {
        self.module_text = text.to_string();
        self
    }

    /// Package the module as `module.wasm` instead of `module.wat`.
    pub fn binary(mut self) -> Self {
        self.binary = true;
        self
    }

    pub fn unsigned(mut self) -> Self {
        self.signing_seed = None;
        self
    }

    pub fn signing_seed(mut self, seed: [u8; 32]) -> Self {
        self.signing_seed = Some(seed);
        self
    }

    /// Sign the configured module but package `text` instead.
    pub fn tamper_module(mut self, text: &str) -> Self {
        self.tampered_module = Some(text.to_string());
        self
    }

    fn module_bytes(&self, text: &str) -> Vec<u8> {
        if self.binary {
            ::wat::parse_str(text).expect("binary fixture must be valid WAT")
        } else {
            text.as_bytes().to_vec()
        }
    }

    /// The gzip'd tar bytes.
    pub fn build(self) -> Vec<u8> {
        let manifest = toml::to_string(&Manifest {
            pkg: &self.pkg,
            name: &self.name,
            version_name: &self.version_name,
            version_code: self.version_code,
            lang: &self.lang,
            nsfw: self.nsfw,
            entry_point: &self.entry_point,
            features: &self.features,
        })
        .unwrap()
        .into_bytes();

        let signed_module = self.module_bytes(&self.module_text);
        let packaged_module = match &self.tampered_module {
            Some(text) => self.module_bytes(text),
            None => signed_module.clone(),
        };
        let module_file = if self.binary { "module.wasm" } else { "module.wat" };

        let mut files: Vec<(&str, Vec<u8>)> = vec![
            ("extension.toml", manifest.clone()),
            (module_file, packaged_module),
        ];

        if let Some(seed) = self.signing_seed {
            let key = SigningKey::from_bytes(&seed);
            let mut message = Sha256::digest(&manifest).to_vec();
            message.extend_from_slice(&Sha256::digest(&signed_module));
            let signature = key.sign(&message);
            let file = SignatureFile {
                public_key: hex::encode(key.verifying_key().to_bytes()),
                signature: hex::encode(signature.to_bytes()),
            };
            files.push(("signature.toml", toml::to_string(&file).unwrap().into_bytes()));
        }

        tar_gz(&files)
    }
}

/// A gzip'd tar of top-level regular files.
pub fn tar_gz(files: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data.as_slice()).unwrap();
    }
    let mut encoder = builder.into_inner().unwrap();
    encoder.flush().unwrap();
    encoder.finish().unwrap()
}
