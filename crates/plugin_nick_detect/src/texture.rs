//! Signed skin-texture reference decoding.
//!
//! Player-list add entries carry a base64 profile property whose JSON body
//! embeds the account's profile name and its skin texture URL. Nicked
//! players keep their real profile payload while the displayed name
//! changes; placeholder skins mean the real identity is hidden entirely.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashSet;

/// Texture hashes of the stock placeholder skins servers hand out when the
/// real skin is withheld. Grown as new placeholders show up in the wild.
static PLACEHOLDER_FINGERPRINTS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        // Stock "steve" and "alex" placeholders.
        "6d3b06c38504ffc0229b9492147c69fcf59fd2ed7885f78502152f77b4d50de1",
        "63b098967340daac529293c24e04910509b208e7b94563c3ef31dec7b3750",
        // Anonymized session-service placeholder.
        "c06f89064c8a49119c29ea1dbd1aab82485a3966d0f535baf898743ad9739cc9",
    ])
});

#[derive(Debug, Deserialize)]
struct ProfilePayload {
    #[serde(rename = "profileName")]
    profile_name: Option<String>,
    #[serde(default)]
    textures: Textures,
}

#[derive(Debug, Default, Deserialize)]
struct Textures {
    #[serde(rename = "SKIN")]
    skin: Option<TextureRef>,
}

#[derive(Debug, Deserialize)]
struct TextureRef {
    url: String,
}

/// The decoded, relevant slice of a texture property.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureProfile {
    pub profile_name: Option<String>,
    pub skin_fingerprint: Option<String>,
}

impl TextureProfile {
    pub fn is_placeholder(&self) -> bool {
        self.skin_fingerprint
            .as_deref()
            .map(|fingerprint| PLACEHOLDER_FINGERPRINTS.contains(fingerprint))
            .unwrap_or(false)
    }
}

/// Decodes a base64 texture property value.
pub fn decode_texture_property(value: &str) -> Result<TextureProfile, String> {
    let raw = BASE64
        .decode(value.trim())
        .map_err(|e| format!("invalid base64: {e}"))?;
    let payload: ProfilePayload =
        serde_json::from_slice(&raw).map_err(|e| format!("invalid profile JSON: {e}"))?;

    let skin_fingerprint = payload
        .textures
        .skin
        .map(|skin| fingerprint_of(&skin.url));
    Ok(TextureProfile {
        profile_name: payload.profile_name,
        skin_fingerprint,
    })
}

/// The fingerprint is the texture URL's final path segment.
fn fingerprint_of(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(url)
        .to_string()
}

#[cfg(test)]
pub(crate) fn encode_texture_property(profile_name: &str, fingerprint: &str) -> String {
    let payload = serde_json::json!({
        "profileName": profile_name,
        "textures": {
            "SKIN": { "url": format!("http://textures.example/texture/{fingerprint}") }
        }
    });
    BASE64.encode(payload.to_string())
}
