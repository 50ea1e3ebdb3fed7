//! Signed-payload (JWS) verification against pinned root certificates
//!
//! The store signs transaction payloads with a certificate chain embedded in
//! the JWS header. Verification pins the chain's root against the trusted
//! set loaded at startup, validates the chain of trust link by link (each
//! certificate must be signed by its issuer), and checks the ES256 signature
//! with the leaf key. With trusted roots configured there is no unverified
//! path: any failure is fatal and the payload is never decoded. With no
//! roots configured at all the verifier runs in a degraded unverified-decode
//! mode and says so loudly on every use.

use crate::{error::ValidationError, models::common::StoreEnvironment};
use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD as BASE64_URL},
    Engine,
};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{instrument, warn};

/// Claims checked during verification; the full payload shape is the
/// decoder's concern.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifierClaims {
    #[serde(default)]
    bundle_id: Option<String>,
    #[serde(default)]
    environment: Option<String>,
}

pub struct SignatureVerifier {
    trusted_root_fingerprints: Vec<[u8; 32]>,
}

impl SignatureVerifier {
    pub fn new(trusted_roots: &[Vec<u8>]) -> Self {
        if trusted_roots.is_empty() {
            warn!(
                "SECURITY: no trusted root certificates configured; \
                 signed payloads will be decoded WITHOUT signature verification"
            );
        }
        Self {
            trusted_root_fingerprints: trusted_roots
                .iter()
                .map(|der| sha256_fingerprint(der))
                .collect(),
        }
    }

    /// True when no trusted roots are configured and verification is skipped.
    pub fn is_degraded(&self) -> bool {
        self.trusted_root_fingerprints.is_empty()
    }

    /// Verify a JWS and return its raw payload bytes.
    ///
    /// `environment` is the environment the payload was retrieved from; the
    /// embedded claims must agree with it and with the expected bundle id.
    #[instrument(skip(self, jws, expected_bundle_id))]
    pub fn verify(
        &self,
        jws: &str,
        expected_bundle_id: &str,
        environment: StoreEnvironment,
    ) -> Result<Vec<u8>, ValidationError> {
        // Structural check first: no decoding or crypto work for inputs that
        // are not even shaped like a JWS.
        let segment_count = jws.split('.').count();
        if segment_count != 3 {
            return Err(ValidationError::MalformedSignature(segment_count));
        }

        if self.is_degraded() {
            warn!("SECURITY: decoding signed payload without verification (no trusted roots)");
            let payload = decode_payload_segment(jws)?;
            let claims: VerifierClaims = serde_json::from_slice(&payload).map_err(|e| {
                ValidationError::SignatureVerification(format!("payload is not JSON: {}", e))
            })?;
            self.check_claims(&claims, expected_bundle_id, environment)?;
            return Ok(payload);
        }

        let header = decode_header(jws).map_err(|e| {
            ValidationError::SignatureVerification(format!("invalid protected header: {}", e))
        })?;
        if header.alg != Algorithm::ES256 {
            return Err(ValidationError::SignatureVerification(format!(
                "unexpected signing algorithm {:?}",
                header.alg
            )));
        }

        let chain = header.x5c.unwrap_or_default();
        if chain.is_empty() {
            return Err(ValidationError::SignatureVerification(
                "no certificate chain in protected header".to_string(),
            ));
        }
        let chain_der = chain
            .iter()
            .map(|cert| BASE64.decode(cert))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                ValidationError::SignatureVerification(format!(
                    "certificate chain is not valid base64: {}",
                    e
                ))
            })?;

        // The chain must terminate at one of the pinned roots.
        let root = match chain_der.last() {
            Some(root) => root,
            None => {
                return Err(ValidationError::SignatureVerification(
                    "empty certificate chain".to_string(),
                ))
            }
        };
        if !self
            .trusted_root_fingerprints
            .contains(&sha256_fingerprint(root))
        {
            return Err(ValidationError::SignatureVerification(
                "certificate chain does not terminate at a trusted root".to_string(),
            ));
        }

        let certificates = chain_der
            .iter()
            .map(|der| Certificate::parse(der))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                ValidationError::SignatureVerification(
                    "certificate chain is not valid DER".to_string(),
                )
            })?;

        // Chain of trust: every certificate must be signed by its issuer,
        // the next certificate in the chain. The pinned root anchors the
        // path; without this walk the leaf key would be attacker-supplied.
        for (position, (child, issuer)) in certificates
            .iter()
            .zip(certificates.iter().skip(1))
            .enumerate()
        {
            if !issuer.issued(child) {
                return Err(ValidationError::SignatureVerification(format!(
                    "certificate {} is not signed by its issuer",
                    position
                )));
            }
        }

        // Signature over header.payload with the leaf certificate's key
        let leaf = &certificates[0];
        if leaf.curve != EcCurve::P256 {
            return Err(ValidationError::SignatureVerification(
                "leaf certificate key is not P-256".to_string(),
            ));
        }
        let key = DecodingKey::from_ec_der(leaf.public_key);

        // Transaction payloads carry no exp/aud registered claims
        let mut validation = Validation::new(Algorithm::ES256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let verified = decode::<VerifierClaims>(jws, &key, &validation)
            .map_err(|e| ValidationError::SignatureVerification(e.to_string()))?;

        self.check_claims(&verified.claims, expected_bundle_id, environment)?;

        decode_payload_segment(jws)
    }

    fn check_claims(
        &self,
        claims: &VerifierClaims,
        expected_bundle_id: &str,
        environment: StoreEnvironment,
    ) -> Result<(), ValidationError> {
        match claims.bundle_id.as_deref() {
            Some(bundle_id) if bundle_id == expected_bundle_id => {}
            Some(bundle_id) => {
                return Err(ValidationError::ClaimMismatch(format!(
                    "bundleId {} does not match expected {}",
                    bundle_id, expected_bundle_id
                )))
            }
            None => {
                return Err(ValidationError::ClaimMismatch(
                    "payload carries no bundleId claim".to_string(),
                ))
            }
        }

        match claims.environment.as_deref() {
            Some(claimed) if claimed == environment.claim_name() => Ok(()),
            Some(claimed) => Err(ValidationError::ClaimMismatch(format!(
                "environment {} does not match {}",
                claimed,
                environment.claim_name()
            ))),
            None => Err(ValidationError::ClaimMismatch(
                "payload carries no environment claim".to_string(),
            )),
        }
    }
}

fn decode_payload_segment(jws: &str) -> Result<Vec<u8>, ValidationError> {
    let segment = jws.split('.').nth(1).unwrap_or_default();
    BASE64_URL.decode(segment).map_err(|e| {
        ValidationError::SignatureVerification(format!(
            "payload segment is not valid base64url: {}",
            e
        ))
    })
}

fn sha256_fingerprint(der: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(der);
    hasher.finalize().into()
}

const TAG_INTEGER: u8 = 0x02;
const TAG_BIT_STRING: u8 = 0x03;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_VERSION: u8 = 0xa0;

const OID_EC_PUBLIC_KEY: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01];
const OID_PRIME256V1: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07];
const OID_SECP384R1: &[u8] = &[0x2b, 0x81, 0x04, 0x00, 0x22];
const OID_ECDSA_SHA256: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x02];
const OID_ECDSA_SHA384: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x03];

/// Sequential DER reader over one level of TLV elements.
struct DerReader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Read one element, returning (tag, content, raw TLV bytes).
    fn read(&mut self) -> Option<(u8, &'a [u8], &'a [u8])> {
        let start = self.pos;
        let tag = *self.input.get(self.pos)?;
        let first = *self.input.get(self.pos + 1)?;
        self.pos += 2;

        let length = if first < 0x80 {
            first as usize
        } else {
            let count = (first & 0x7f) as usize;
            if count == 0 || count > 4 {
                return None;
            }
            let mut length = 0usize;
            for _ in 0..count {
                length = (length << 8) | *self.input.get(self.pos)? as usize;
                self.pos += 1;
            }
            length
        };

        let content = self.input.get(self.pos..self.pos + length)?;
        self.pos += length;
        let raw = self.input.get(start..self.pos)?;
        Some((tag, content, raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EcCurve {
    P256,
    P384,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignatureHash {
    Sha256,
    Sha384,
}

/// The parts of an X.509 certificate the chain walk needs: the signed
/// TBSCertificate bytes, the signature over them, and the subject's EC key.
struct Certificate<'a> {
    tbs: &'a [u8],
    signature_hash: SignatureHash,
    signature: &'a [u8],
    curve: EcCurve,
    public_key: &'a [u8],
}

impl<'a> Certificate<'a> {
    /// Walk the ASN.1 structure down to the SubjectPublicKeyInfo. The key is
    /// taken from there and nowhere else, so OID byte sequences occurring
    /// earlier (names, extensions, nested algorithm identifiers) cannot be
    /// mistaken for it.
    fn parse(der: &'a [u8]) -> Option<Self> {
        // Certificate ::= SEQUENCE { tbsCertificate, signatureAlgorithm, signatureValue }
        let mut outer = DerReader::new(der);
        let (cert_tag, cert_body, _) = outer.read()?;
        if cert_tag != TAG_SEQUENCE {
            return None;
        }

        let mut cert = DerReader::new(cert_body);
        let (tbs_tag, tbs_body, tbs_raw) = cert.read()?;
        if tbs_tag != TAG_SEQUENCE {
            return None;
        }
        let (alg_tag, alg_body, _) = cert.read()?;
        if alg_tag != TAG_SEQUENCE {
            return None;
        }
        let signature_hash = signature_hash_from_algorithm(alg_body)?;
        let (sig_tag, sig_body, _) = cert.read()?;
        if sig_tag != TAG_BIT_STRING || sig_body.first() != Some(&0) {
            return None;
        }
        let signature = &sig_body[1..];

        // TBSCertificate ::= SEQUENCE { [0] version OPTIONAL, serialNumber,
        //   signature, issuer, validity, subject, subjectPublicKeyInfo, ... }
        let mut tbs = DerReader::new(tbs_body);
        let (first_tag, _, _) = tbs.read()?;
        if first_tag == TAG_VERSION {
            let (serial_tag, _, _) = tbs.read()?;
            if serial_tag != TAG_INTEGER {
                return None;
            }
        } else if first_tag != TAG_INTEGER {
            return None;
        }
        for _ in 0..4 {
            let (tag, _, _) = tbs.read()?;
            if tag != TAG_SEQUENCE {
                return None;
            }
        }
        let (spki_tag, spki_body, _) = tbs.read()?;
        if spki_tag != TAG_SEQUENCE {
            return None;
        }

        // SubjectPublicKeyInfo ::= SEQUENCE { AlgorithmIdentifier, BIT STRING }
        let mut spki = DerReader::new(spki_body);
        let (spki_alg_tag, spki_alg_body, _) = spki.read()?;
        if spki_alg_tag != TAG_SEQUENCE {
            return None;
        }
        let mut spki_alg = DerReader::new(spki_alg_body);
        let (key_oid_tag, key_oid, _) = spki_alg.read()?;
        if key_oid_tag != TAG_OID || key_oid != OID_EC_PUBLIC_KEY {
            return None;
        }
        let (curve_tag, curve_oid, _) = spki_alg.read()?;
        if curve_tag != TAG_OID {
            return None;
        }
        let curve = if curve_oid == OID_PRIME256V1 {
            EcCurve::P256
        } else if curve_oid == OID_SECP384R1 {
            EcCurve::P384
        } else {
            return None;
        };

        let (key_tag, key_body, _) = spki.read()?;
        if key_tag != TAG_BIT_STRING || key_body.first() != Some(&0) {
            return None;
        }
        let public_key = &key_body[1..];
        let expected_len = match curve {
            EcCurve::P256 => 65,
            EcCurve::P384 => 97,
        };
        if public_key.len() != expected_len || public_key[0] != 0x04 {
            return None;
        }

        Some(Certificate {
            tbs: tbs_raw,
            signature_hash,
            signature,
            curve,
            public_key,
        })
    }

    /// Whether this certificate's key verifies `child`'s signature over its
    /// TBSCertificate bytes.
    fn issued(&self, child: &Certificate) -> bool {
        let algorithm = verification_algorithm(self.curve, child.signature_hash);
        ring::signature::UnparsedPublicKey::new(algorithm, self.public_key)
            .verify(child.tbs, child.signature)
            .is_ok()
    }
}

fn signature_hash_from_algorithm(alg_body: &[u8]) -> Option<SignatureHash> {
    let mut alg = DerReader::new(alg_body);
    let (tag, oid, _) = alg.read()?;
    if tag != TAG_OID {
        return None;
    }
    if oid == OID_ECDSA_SHA256 {
        Some(SignatureHash::Sha256)
    } else if oid == OID_ECDSA_SHA384 {
        Some(SignatureHash::Sha384)
    } else {
        None
    }
}

/// Certificate signatures are ASN.1-encoded ECDSA; the curve comes from the
/// issuer's key and the hash from the child's signature algorithm.
fn verification_algorithm(
    curve: EcCurve,
    hash: SignatureHash,
) -> &'static dyn ring::signature::VerificationAlgorithm {
    use ring::signature::{
        ECDSA_P256_SHA256_ASN1, ECDSA_P256_SHA384_ASN1, ECDSA_P384_SHA256_ASN1,
        ECDSA_P384_SHA384_ASN1,
    };
    match (curve, hash) {
        (EcCurve::P256, SignatureHash::Sha256) => &ECDSA_P256_SHA256_ASN1,
        (EcCurve::P256, SignatureHash::Sha384) => &ECDSA_P256_SHA384_ASN1,
        (EcCurve::P384, SignatureHash::Sha256) => &ECDSA_P384_SHA256_ASN1,
        (EcCurve::P384, SignatureHash::Sha384) => &ECDSA_P384_SHA384_ASN1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64url(s: &str) -> String {
        BASE64_URL.encode(s)
    }

    fn unsigned_jws(payload: &str) -> String {
        format!(
            "{}.{}.{}",
            b64url(r#"{"alg":"ES256"}"#),
            b64url(payload),
            b64url("sig")
        )
    }

    fn degraded() -> SignatureVerifier {
        SignatureVerifier::new(&[])
    }

    fn pinned() -> SignatureVerifier {
        SignatureVerifier::new(&[vec![0x30, 0x82, 0x01, 0x02]])
    }

    fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        let length = content.len();
        if length < 0x80 {
            out.push(length as u8);
        } else if length <= 0xff {
            out.extend_from_slice(&[0x81, length as u8]);
        } else {
            out.extend_from_slice(&[0x82, (length >> 8) as u8, (length & 0xff) as u8]);
        }
        out.extend_from_slice(content);
        out
    }

    /// Well-formed but unsigned certificate with a P-256 key of `fill`
    /// bytes. The issuer name deliberately embeds the curve OID so that
    /// anything scanning for OID bytes instead of walking the structure
    /// would latch onto the wrong place.
    fn test_certificate(fill: u8, signature: &[u8]) -> Vec<u8> {
        let serial = tlv(TAG_INTEGER, &[1]);
        let sig_alg = tlv(TAG_SEQUENCE, &tlv(TAG_OID, OID_ECDSA_SHA256));
        let decoy = tlv(TAG_SEQUENCE, &tlv(TAG_OID, OID_PRIME256V1));
        let issuer = tlv(TAG_SEQUENCE, &decoy);
        let validity = tlv(TAG_SEQUENCE, &[]);
        let subject = tlv(TAG_SEQUENCE, &[]);

        let mut key_bits = vec![0x00, 0x04];
        key_bits.extend_from_slice(&[fill; 64]);
        let spki_alg = tlv(
            TAG_SEQUENCE,
            &[tlv(TAG_OID, OID_EC_PUBLIC_KEY), tlv(TAG_OID, OID_PRIME256V1)].concat(),
        );
        let spki = tlv(
            TAG_SEQUENCE,
            &[spki_alg, tlv(TAG_BIT_STRING, &key_bits)].concat(),
        );

        let tbs = tlv(
            TAG_SEQUENCE,
            &[serial, sig_alg.clone(), issuer, validity, subject, spki].concat(),
        );

        let mut sig_bits = vec![0x00];
        sig_bits.extend_from_slice(signature);
        tlv(
            TAG_SEQUENCE,
            &[tbs, sig_alg, tlv(TAG_BIT_STRING, &sig_bits)].concat(),
        )
    }

    fn jws_with_chain(chain: &[&[u8]], payload: &str) -> String {
        let encoded: Vec<String> = chain
            .iter()
            .map(|cert| format!("\"{}\"", BASE64.encode(cert)))
            .collect();
        let header = format!(r#"{{"alg":"ES256","x5c":[{}]}}"#, encoded.join(","));
        format!(
            "{}.{}.{}",
            b64url(&header),
            b64url(payload),
            b64url("sig")
        )
    }

    #[test]
    fn test_two_segments_fail_fast() {
        let err = pinned()
            .verify("header.payload", "com.example.app", StoreEnvironment::Production)
            .unwrap_err();
        assert!(matches!(err, ValidationError::MalformedSignature(2)));
    }

    #[test]
    fn test_four_segments_fail_fast() {
        let err = degraded()
            .verify("a.b.c.d", "com.example.app", StoreEnvironment::Production)
            .unwrap_err();
        assert!(matches!(err, ValidationError::MalformedSignature(4)));
    }

    #[test]
    fn test_degraded_mode_decodes_and_checks_claims() {
        let jws = unsigned_jws(
            r#"{"bundleId":"com.example.app","environment":"Sandbox","transactionId":"T1"}"#,
        );
        let payload = degraded()
            .verify(&jws, "com.example.app", StoreEnvironment::Sandbox)
            .unwrap();
        let text = String::from_utf8(payload).unwrap();
        assert!(text.contains("\"transactionId\":\"T1\""));
    }

    #[test]
    fn test_degraded_mode_rejects_bundle_mismatch() {
        let jws =
            unsigned_jws(r#"{"bundleId":"com.other.app","environment":"Production"}"#);
        let err = degraded()
            .verify(&jws, "com.example.app", StoreEnvironment::Production)
            .unwrap_err();
        assert!(matches!(err, ValidationError::ClaimMismatch(_)));
    }

    #[test]
    fn test_degraded_mode_rejects_environment_mismatch() {
        let jws =
            unsigned_jws(r#"{"bundleId":"com.example.app","environment":"Sandbox"}"#);
        let err = degraded()
            .verify(&jws, "com.example.app", StoreEnvironment::Production)
            .unwrap_err();
        assert!(matches!(err, ValidationError::ClaimMismatch(_)));
    }

    #[test]
    fn test_pinned_mode_requires_certificate_chain() {
        let jws = unsigned_jws(r#"{"bundleId":"com.example.app"}"#);
        let err = pinned()
            .verify(&jws, "com.example.app", StoreEnvironment::Production)
            .unwrap_err();
        assert!(matches!(err, ValidationError::SignatureVerification(_)));
    }

    #[test]
    fn test_pinned_mode_rejects_untrusted_root() {
        let jws = jws_with_chain(
            &[&[0xde, 0xad, 0xbe, 0xef]],
            r#"{"bundleId":"com.example.app","environment":"Production"}"#,
        );
        let err = pinned()
            .verify(&jws, "com.example.app", StoreEnvironment::Production)
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::SignatureVerification(ref msg) if msg.contains("trusted root")
        ));
    }

    #[test]
    fn test_pinned_mode_rejects_leaf_not_signed_by_chain() {
        // A forged leaf paired with a genuinely pinned root: the terminal
        // fingerprint matches, but the root never signed the leaf, so the
        // chain walk must refuse it.
        let leaf = test_certificate(0xaa, &[0x01, 0x02, 0x03]);
        let root = test_certificate(0xbb, &[0x04, 0x05, 0x06]);
        let verifier = SignatureVerifier::new(&[root.clone()]);

        let jws = jws_with_chain(
            &[&leaf, &root],
            r#"{"bundleId":"com.example.app","environment":"Production"}"#,
        );
        let err = verifier
            .verify(&jws, "com.example.app", StoreEnvironment::Production)
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::SignatureVerification(ref msg) if msg.contains("issuer")
        ));
    }

    #[test]
    fn test_pinned_mode_rejects_foreign_algorithm() {
        let header = r#"{"alg":"HS256"}"#;
        let jws = format!(
            "{}.{}.{}",
            b64url(header),
            b64url(r#"{"bundleId":"com.example.app"}"#),
            b64url("sig")
        );
        let err = pinned()
            .verify(&jws, "com.example.app", StoreEnvironment::Production)
            .unwrap_err();
        assert!(matches!(err, ValidationError::SignatureVerification(_)));
    }

    #[test]
    fn test_certificate_parse_walks_to_the_key() {
        let der = test_certificate(0xaa, &[0x01, 0x02, 0x03]);
        let cert = Certificate::parse(&der).unwrap();

        // The decoy OID in the issuer name is ignored; the key comes from
        // the SubjectPublicKeyInfo alone
        assert_eq!(cert.curve, EcCurve::P256);
        assert_eq!(cert.public_key.len(), 65);
        assert_eq!(cert.public_key[0], 0x04);
        assert_eq!(&cert.public_key[1..], &[0xaa; 64]);
        assert_eq!(cert.signature, &[0x01, 0x02, 0x03]);
        assert_eq!(cert.signature_hash, SignatureHash::Sha256);
        // The signed portion is the complete TBSCertificate TLV
        assert_eq!(cert.tbs[0], TAG_SEQUENCE);
    }

    #[test]
    fn test_certificate_parse_rejects_malformed_input() {
        assert!(Certificate::parse(&[]).is_none());
        assert!(Certificate::parse(&[0xde, 0xad, 0xbe, 0xef]).is_none());
        // Truncated: a valid prefix with the signature cut off
        let der = test_certificate(0xaa, &[0x01]);
        assert!(Certificate::parse(&der[..der.len() - 3]).is_none());
    }
}
