//! Spotify Web API client (client-credentials flow).

use super::{SourceAlbum, SourceArtist, SourceCatalog};
use crate::catalog_http::{read_json, CatalogError};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";
const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
/// Tokens are refreshed this long before they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

pub struct SpotifyClient {
    client: Client,
    credentials: SpotifyCredentials,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct ArtistsResponse {
    #[serde(default)]
    artists: Vec<Option<SpotifyArtist>>,
}

#[derive(Deserialize)]
struct SpotifyArtist {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct AlbumsResponse {
    #[serde(default)]
    albums: Vec<Option<SpotifyAlbum>>,
}

#[derive(Deserialize)]
struct SpotifyAlbum {
    id: String,
    name: String,
    external_ids: Option<ExternalIds>,
}

#[derive(Deserialize)]
struct ExternalIds {
    upc: Option<String>,
}

/// Strip the `spotify:<kind>:` prefix off a source identity.
fn bare_id<'a>(source_id: &'a str, kind: &str) -> Result<&'a str, CatalogError> {
    let mut parts = source_id.split(':');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("spotify"), Some(k), Some(id), None) if k == kind && !id.is_empty() => Ok(id),
        _ => Err(CatalogError::InvalidIdentifier(format!(
            "expected spotify:{}:<id>, got {:?}",
            kind, source_id
        ))),
    }
}

/// Comma-joined bare ids for a batch request. Malformed identities are
/// logged and left out so they don't sink the rest of the batch; `None` when
/// nothing is left to request.
fn join_bare_ids(source_ids: &[String], kind: &str) -> Option<String> {
    let ids: Vec<&str> = source_ids
        .iter()
        .filter_map(|id| match bare_id(id, kind) {
            Ok(bare) => Some(bare),
            Err(e) => {
                warn!("Skipping {} lookup: {}", kind, e);
                None
            }
        })
        .collect();
    if ids.is_empty() {
        None
    } else {
        Some(ids.join(","))
    }
}

fn artists_from_response(response: ArtistsResponse) -> Vec<SourceArtist> {
    response
        .artists
        .into_iter()
        .flatten()
        .map(|a| SourceArtist {
            source_id: format!("spotify:artist:{}", a.id),
            name: a.name,
        })
        .collect()
}

fn albums_from_response(response: AlbumsResponse) -> Vec<SourceAlbum> {
    response
        .albums
        .into_iter()
        .flatten()
        .map(|a| SourceAlbum {
            source_id: format!("spotify:album:{}", a.id),
            name: a.name,
            upc: a
                .external_ids
                .and_then(|ids| ids.upc)
                .filter(|upc| !upc.trim().is_empty()),
        })
        .collect()
}

impl SpotifyClient {
    pub fn new(credentials: SpotifyCredentials, timeout: Duration) -> Result<Self, CatalogError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            credentials,
            token: Mutex::new(None),
        })
    }

    /// Bearer token for the next call, exchanging credentials when the cached
    /// one is missing or about to expire.
    fn access_token(&self) -> Result<String, CatalogError> {
        let mut cached = self.token.lock().unwrap();
        if let Some(token) = cached.as_ref() {
            if Instant::now() + TOKEN_EXPIRY_MARGIN < token.expires_at {
                return Ok(token.access_token.clone());
            }
        }

        debug!("Requesting Spotify access token");
        let response = self
            .client
            .post(SPOTIFY_TOKEN_URL)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
            ])
            .send()?;
        let token: TokenResponse = match read_json(response) {
            Ok(token) => token,
            Err(CatalogError::Status { status, body }) => {
                return Err(CatalogError::Auth(format!("status {}: {}", status, body)))
            }
            Err(e) => return Err(e),
        };

        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(access_token)
    }

    fn get_batch<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        ids: String,
    ) -> Result<T, CatalogError> {
        let token = self.access_token()?;
        let url = format!("{}/{}", SPOTIFY_API_BASE, path);
        let response = self
            .client
            .get(&url)
            .query(&[("ids", ids)])
            .bearer_auth(token)
            .send()?;
        read_json(response)
    }
}

impl SourceCatalog for SpotifyClient {
    fn get_artists(&self, source_ids: &[String]) -> Result<Vec<SourceArtist>, CatalogError> {
        let Some(ids) = join_bare_ids(source_ids, "artist") else {
            return Ok(Vec::new());
        };
        let response: ArtistsResponse = self.get_batch("artists", ids)?;
        Ok(artists_from_response(response))
    }

    fn get_albums(&self, source_ids: &[String]) -> Result<Vec<SourceAlbum>, CatalogError> {
        let Some(ids) = join_bare_ids(source_ids, "album") else {
            return Ok(Vec::new());
        };
        let response: AlbumsResponse = self.get_batch("albums", ids)?;
        Ok(albums_from_response(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_http::parse_json;

    #[test]
    fn test_bare_id() {
        assert_eq!(
            bare_id("spotify:artist:4Z8W4fKeB5YxbusRsdQVPb", "artist").unwrap(),
            "4Z8W4fKeB5YxbusRsdQVPb"
        );
        assert!(bare_id("spotify:album:4Z8W", "artist").is_err());
        assert!(bare_id("4Z8W", "artist").is_err());
        assert!(bare_id("spotify:artist:", "artist").is_err());
    }

    fn ids(source_ids: &[&str]) -> Vec<String> {
        source_ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_join_bare_ids() {
        let album_ids = ids(&["spotify:album:a", "spotify:album:b"]);
        assert_eq!(join_bare_ids(&album_ids, "album").as_deref(), Some("a,b"));
        assert_eq!(join_bare_ids(&[], "album"), None);
    }

    #[test]
    fn test_join_bare_ids_skips_malformed_entries() {
        let artist_ids = ids(&["artist:1", "spotify:artist:good", "spotify:album:x"]);
        assert_eq!(join_bare_ids(&artist_ids, "artist").as_deref(), Some("good"));

        let all_bad = ids(&["artist:1", "spotify:artist:"]);
        assert_eq!(join_bare_ids(&all_bad, "artist"), None);
    }

    #[test]
    fn test_batch_of_malformed_ids_is_not_requested() {
        let client = SpotifyClient::new(
            SpotifyCredentials {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
            },
            Duration::from_secs(1),
        )
        .unwrap();

        // No token exchange or lookup happens, so this succeeds offline.
        let artists = client.get_artists(&ids(&["artist:1", "4Z8W"])).unwrap();
        assert!(artists.is_empty());
        let albums = client.get_albums(&ids(&["spotify:artist:1"])).unwrap();
        assert!(albums.is_empty());
        assert!(client.token.lock().unwrap().is_none());
    }

    #[test]
    fn test_artists_response_skips_null_entries() {
        let body = r#"{"artists":[{"id":"1","name":"A","genres":[]},null,{"id":"2","name":"B"}]}"#;
        let artists = artists_from_response(parse_json(body).unwrap());
        assert_eq!(
            artists,
            vec![
                SourceArtist {
                    source_id: "spotify:artist:1".to_string(),
                    name: "A".to_string(),
                },
                SourceArtist {
                    source_id: "spotify:artist:2".to_string(),
                    name: "B".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_albums_response_upc_is_optional() {
        let body = r#"{"albums":[
            {"id":"1","name":"With UPC","external_ids":{"upc":"00602537518357"}},
            {"id":"2","name":"No ids"},
            {"id":"3","name":"Empty UPC","external_ids":{"upc":""}}
        ]}"#;
        let albums = albums_from_response(parse_json(body).unwrap());
        let upcs: Vec<Option<&str>> = albums.iter().map(|a| a.upc.as_deref()).collect();
        assert_eq!(upcs, vec![Some("00602537518357"), None, None]);
        assert_eq!(albums[1].source_id, "spotify:album:2");
    }
}
