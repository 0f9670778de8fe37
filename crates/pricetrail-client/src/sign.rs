//! Request signing for the catalog gateway.
//!
//! The base string is every parameter except `sign` and absent values,
//! sorted by key, concatenated as `key + value` with no separator.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use reqwest::Url;
use sha2::Sha256;

use crate::error::ClientError;

type HmacSha256 = Hmac<Sha256>;

/// Digest used to produce `sign`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignAlgorithm {
    /// HMAC-SHA256 keyed with the secret.
    HmacSha256,
    /// MD5 over `secret + base + secret`.
    Md5,
}

/// Value sent as `sign_method`. Gateways disagree on the spelling for
/// HMAC-SHA256, so both are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignMethod {
    Sha256,
    HmacSha256,
    Md5,
}

impl SignMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SignMethod::Sha256 => "sha256",
            SignMethod::HmacSha256 => "hmac-sha256",
            SignMethod::Md5 => "md5",
        }
    }

    #[must_use]
    pub fn algorithm(self) -> SignAlgorithm {
        match self {
            SignMethod::Sha256 | SignMethod::HmacSha256 => SignAlgorithm::HmacSha256,
            SignMethod::Md5 => SignAlgorithm::Md5,
        }
    }
}

impl std::fmt::Display for SignMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request parameters, kept sorted by key.
///
/// A key mapped to `None` is treated as absent: it is neither signed nor
/// sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiParams {
    entries: BTreeMap<String, Option<String>>,
}

impl ApiParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.insert(key.into(), Some(value.into()));
        self
    }

    pub fn insert_opt(&mut self, key: impl Into<String>, value: Option<String>) -> &mut Self {
        self.entries.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(|v| v.as_deref())
    }

    /// Present entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
    }

    #[must_use]
    pub fn base_string(&self) -> String {
        self.iter()
            .filter(|(k, _)| *k != "sign")
            .fold(String::new(), |mut acc, (k, v)| {
                acc.push_str(k);
                acc.push_str(v);
                acc
            })
    }

    /// Signs the parameters and stores the result under `sign`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Signing`] if the digest cannot be keyed.
    pub fn sign_with(&mut self, secret: &str, algorithm: SignAlgorithm) -> Result<(), ClientError> {
        let signature = sign(self, secret, algorithm)?;
        self.insert("sign", signature);
        Ok(())
    }

    /// Appends every present entry to `url` as a query pair.
    pub fn append_to(&self, url: &mut Url) {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in self.iter() {
            pairs.append_pair(k, v);
        }
    }
}

/// Computes the upper-case hex signature of `params`.
///
/// Any existing `sign` entry is ignored, so re-signing is stable.
///
/// # Errors
///
/// Returns [`ClientError::Signing`] if the HMAC key is rejected.
pub fn sign(params: &ApiParams, secret: &str, algorithm: SignAlgorithm) -> Result<String, ClientError> {
    let base = params.base_string();
    match algorithm {
        SignAlgorithm::HmacSha256 => {
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                .map_err(|e| ClientError::Signing(e.to_string()))?;
            mac.update(base.as_bytes());
            Ok(hex::encode_upper(mac.finalize().into_bytes()))
        }
        SignAlgorithm::Md5 => {
            let mut hasher = Md5::new();
            hasher.update(secret.as_bytes());
            hasher.update(base.as_bytes());
            hasher.update(secret.as_bytes());
            Ok(hex::encode_upper(hasher.finalize()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> ApiParams {
        let mut p = ApiParams::new();
        p.insert("timestamp", "1700000000000")
            .insert("method", "aliexpress.affiliate.product.query")
            .insert("app_key", "12345")
            .insert("sign_method", "sha256")
            .insert("page_no", "1");
        p
    }

    #[test]
    fn base_string_is_sorted_and_unseparated() {
        assert_eq!(
            sample().base_string(),
            "app_key12345methodaliexpress.affiliate.product.querypage_no1sign_methodsha256timestamp1700000000000"
        );
    }

    #[test]
    fn hmac_sha256_matches_known_vector() {
        let sig = sign(&sample(), "secret", SignAlgorithm::HmacSha256).unwrap();
        assert_eq!(
            sig,
            "DFD2A439D5EE23B3FD02E115B48423405DA28C42DCB1A5E98D90F8A94E7B1641"
        );
    }

    #[test]
    fn md5_wraps_base_in_secret() {
        let sig = sign(&sample(), "secret", SignAlgorithm::Md5).unwrap();
        assert_eq!(sig, "7316044B377B9BCDE31EA1C7E66E5DD7");
    }

    #[test]
    fn existing_sign_and_absent_values_are_excluded() {
        let mut p = sample();
        p.insert("sign", "STALE").insert_opt("keywords", None);
        let sig = sign(&p, "secret", SignAlgorithm::HmacSha256).unwrap();
        assert_eq!(
            sig,
            "DFD2A439D5EE23B3FD02E115B48423405DA28C42DCB1A5E98D90F8A94E7B1641"
        );
    }

    #[test]
    fn sign_with_stores_signature() {
        let mut p = sample();
        p.sign_with("secret", SignAlgorithm::Md5).unwrap();
        assert_eq!(p.get("sign"), Some("7316044B377B9BCDE31EA1C7E66E5DD7"));
    }

    #[test]
    fn sign_method_wire_names() {
        assert_eq!(SignMethod::Sha256.as_str(), "sha256");
        assert_eq!(SignMethod::HmacSha256.as_str(), "hmac-sha256");
        assert_eq!(SignMethod::Md5.algorithm(), SignAlgorithm::Md5);
        assert_eq!(SignMethod::Sha256.algorithm(), SignAlgorithm::HmacSha256);
    }

    #[test]
    fn append_to_skips_absent_values() {
        let mut p = ApiParams::new();
        p.insert("a", "1 2").insert_opt("b", None);
        let mut url = Url::parse("https://gw.example.com/sync").unwrap();
        p.append_to(&mut url);
        assert_eq!(url.query(), Some("a=1+2"));
    }

    proptest! {
        #[test]
        fn signature_ignores_insertion_order(
            entries in prop::collection::vec(("[a-z_]{1,12}", "[ -~]{0,20}"), 0..16),
            secret in "[A-Za-z0-9]{1,32}",
        ) {
            let mut forward = ApiParams::new();
            for (k, v) in &entries {
                forward.insert(k.clone(), v.clone());
            }
            // Same final map, built in reverse with the duplicates resolved
            // the way forward insertion resolves them.
            let mut reverse = ApiParams::new();
            let mut seen = std::collections::HashSet::new();
            for (k, v) in entries.iter().rev() {
                if seen.insert(k.clone()) {
                    reverse.insert(k.clone(), v.clone());
                }
            }
            for algorithm in [SignAlgorithm::HmacSha256, SignAlgorithm::Md5] {
                prop_assert_eq!(
                    sign(&forward, &secret, algorithm).unwrap(),
                    sign(&reverse, &secret, algorithm).unwrap()
                );
            }
        }

        #[test]
        fn signature_ignores_sign_and_absent_entries(
            entries in prop::collection::btree_map("[a-r]{1,8}", "[ -~]{0,20}", 0..12),
            stale in "[A-F0-9]{0,32}",
            absent_key in "[s-z]{1,8}",
        ) {
            let mut clean = ApiParams::new();
            for (k, v) in &entries {
                clean.insert(k.clone(), v.clone());
            }
            let mut noisy = clean.clone();
            noisy.insert("sign", stale).insert_opt(absent_key, None);
            prop_assert_eq!(
                sign(&clean, "s3cret", SignAlgorithm::HmacSha256).unwrap(),
                sign(&noisy, "s3cret", SignAlgorithm::HmacSha256).unwrap()
            );
        }
    }
}
