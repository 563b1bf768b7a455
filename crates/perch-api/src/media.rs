use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signed URLs stay valid for an hour.
pub const URL_TTL_SECS: i64 = 3600;

/// File extensions accepted for uploaded images.
pub const ALLOWED_IMAGE_TYPES: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaMethod {
    Get,
    Put,
}

impl MediaMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaMethod::Get => "GET",
            MediaMethod::Put => "PUT",
        }
    }
}

/// Issues time-limited URLs for objects in the media store.
///
/// A URL has the form `{base_url}/{key}?method=..&expires=..&signature=..`
/// where the signature is a hex HMAC-SHA256 over `method\nkey\nexpires`.
#[derive(Clone)]
pub struct MediaSigner {
    base_url: String,
    mac: HmacSha256,
}

impl MediaSigner {
    pub fn new(base_url: &str, secret: &[u8]) -> anyhow::Result<Self> {
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| anyhow::anyhow!("invalid media signing key: {}", e))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            mac,
        })
    }

    pub fn sign(&self, key: &str, method: MediaMethod) -> String {
        self.sign_at(key, method, chrono::Utc::now().timestamp())
    }

    pub fn sign_at(&self, key: &str, method: MediaMethod, now: i64) -> String {
        let expires = now + URL_TTL_SECS;
        let signature = self.signature(key, method, expires);
        format!(
            "{}/{}?method={}&expires={}&signature={}",
            self.base_url,
            key,
            method.as_str(),
            expires,
            signature
        )
    }

    /// Turn a stored media reference into something a client can fetch.
    /// Full URLs pass through untouched; bare keys get a signed GET URL.
    pub fn resolve(&self, reference: &str) -> String {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            reference.to_string()
        } else {
            self.sign(reference, MediaMethod::Get)
        }
    }

    fn signature(&self, key: &str, method: MediaMethod, expires: i64) -> String {
        let mut mac = self.mac.clone();
        mac.update(signing_input(key, method, expires).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

fn signing_input(key: &str, method: MediaMethod, expires: i64) -> String {
    format!("{}\n{}\n{}", method.as_str(), key, expires)
}

/// Normalize and check an upload's file type, returning the extension to use.
pub fn image_extension(file_type: &str) -> Option<String> {
    let ext = file_type
        .trim()
        .trim_start_matches('.')
        .trim_start_matches("image/")
        .to_ascii_lowercase();
    ALLOWED_IMAGE_TYPES.contains(&ext.as_str()).then_some(ext)
}

/// Fresh object key under `prefix`, e.g. `posts/<user>/<32 hex chars>.png`.
pub fn new_object_key(prefix: &str, ext: &str) -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    format!("{}/{}.{}", prefix, hex::encode(bytes), ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> MediaSigner {
        MediaSigner::new("http://media.test/bucket/", b"test-secret").unwrap()
    }

    #[test]
    fn signature_binds_key_method_and_expiry() {
        let signer = signer();
        let url = signer.sign_at("posts/a.png", MediaMethod::Put, 1_000);

        assert!(url.starts_with("http://media.test/bucket/posts/a.png?method=PUT&expires=4600&signature="));
        let signature = url.rsplit("signature=").next().unwrap();
        assert_eq!(signature.len(), 64);

        assert_eq!(url, signer.sign_at("posts/a.png", MediaMethod::Put, 1_000));
        assert!(!signer.sign_at("posts/a.png", MediaMethod::Get, 1_000).ends_with(signature));
        assert!(!signer.sign_at("posts/b.png", MediaMethod::Put, 1_000).ends_with(signature));
        assert!(!signer.sign_at("posts/a.png", MediaMethod::Put, 1_001).ends_with(signature));
    }

    #[test]
    fn full_urls_pass_through() {
        let signer = signer();
        assert_eq!(signer.resolve("https://cdn.test/x.png"), "https://cdn.test/x.png");
        assert!(signer.resolve("posts/x.png").contains("method=GET"));
    }

    #[test]
    fn only_image_types_are_accepted() {
        assert_eq!(image_extension("PNG").as_deref(), Some("png"));
        assert_eq!(image_extension("image/jpeg").as_deref(), Some("jpeg"));
        assert_eq!(image_extension(".jpg").as_deref(), Some("jpg"));
        assert!(image_extension("gif").is_none());
        assert!(image_extension("exe").is_none());
    }

    #[test]
    fn object_keys_are_unique() {
        let a = new_object_key("posts/u", "png");
        let b = new_object_key("posts/u", "png");
        assert_ne!(a, b);
        assert!(a.starts_with("posts/u/") && a.ends_with(".png"));
    }
}
