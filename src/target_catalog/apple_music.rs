//! Apple Music API client authenticated with a developer token and a user
//! token.

use super::{NewPlaylist, TargetAlbum, TargetCatalog, TargetSong};
use crate::catalog_http::{read_json, CatalogError};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, ORIGIN, REFERER};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const APPLE_MUSIC_API_BASE: &str = "https://amp-api.music.apple.com";
const APPLE_MUSIC_WEB_ORIGIN: &str = "https://music.apple.com";

#[derive(Clone, Debug)]
pub struct AppleMusicCredentials {
    pub developer_token: String,
    pub user_token: String,
}

pub struct AppleMusicClient {
    client: Client,
    base_url: String,
    storefront: String,
    locale: String,
}

#[derive(Deserialize)]
struct DataResponse<A> {
    #[serde(default = "Vec::new")]
    data: Vec<Resource<A>>,
}

#[derive(Deserialize)]
struct Resource<A> {
    id: String,
    attributes: Option<A>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SongAttributes {
    name: String,
    #[serde(default)]
    artist_name: String,
    isrc: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlbumAttributes {
    name: String,
    #[serde(default)]
    artist_name: String,
    upc: Option<String>,
}

#[derive(Deserialize)]
struct Created {}

#[derive(Serialize)]
struct CreateFolderBody<'a> {
    attributes: NameAttributes<'a>,
}

#[derive(Serialize)]
struct NameAttributes<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct CreatePlaylistBody<'a> {
    attributes: PlaylistAttributes<'a>,
    relationships: PlaylistRelationships<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistAttributes<'a> {
    name: &'a str,
    description: &'a str,
    is_public: bool,
}

#[derive(Serialize)]
struct PlaylistRelationships<'a> {
    tracks: RelationshipData<'a>,
    parent: RelationshipData<'a>,
}

#[derive(Serialize)]
struct RelationshipData<'a> {
    data: Vec<ResourceRef<'a>>,
}

#[derive(Serialize)]
struct ResourceRef<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
}

fn playlist_body(playlist: &NewPlaylist) -> CreatePlaylistBody<'_> {
    CreatePlaylistBody {
        attributes: PlaylistAttributes {
            name: &playlist.name,
            description: &playlist.description,
            is_public: playlist.is_public,
        },
        relationships: PlaylistRelationships {
            tracks: RelationshipData {
                data: playlist
                    .track_ids
                    .iter()
                    .map(|id| ResourceRef { id, kind: "songs" })
                    .collect(),
            },
            parent: RelationshipData {
                data: vec![ResourceRef {
                    id: &playlist.parent_folder_id,
                    kind: "library-playlist-folders",
                }],
            },
        },
    }
}

fn songs_from_response(response: DataResponse<SongAttributes>) -> Vec<TargetSong> {
    response
        .data
        .into_iter()
        .filter_map(|resource| {
            let attributes = resource.attributes?;
            let isrc = attributes.isrc?.to_uppercase();
            Some(TargetSong {
                id: resource.id,
                name: attributes.name,
                artist_name: attributes.artist_name,
                isrc,
            })
        })
        .collect()
}

fn albums_from_response(response: DataResponse<AlbumAttributes>) -> Vec<TargetAlbum> {
    response
        .data
        .into_iter()
        .filter_map(|resource| {
            let attributes = resource.attributes?;
            let upc = attributes.upc?;
            Some(TargetAlbum {
                id: resource.id,
                name: attributes.name,
                artist_name: attributes.artist_name,
                upc,
            })
        })
        .collect()
}

/// Id of the first resource in a creation response.
fn created_id(response: DataResponse<Created>) -> Result<String, CatalogError> {
    response
        .data
        .into_iter()
        .next()
        .map(|resource| resource.id)
        .ok_or_else(|| CatalogError::Decode("creation response has no data".to_string()))
}

fn header_value(value: &str, what: &str) -> Result<HeaderValue, CatalogError> {
    HeaderValue::from_str(value)
        .map_err(|_| CatalogError::Auth(format!("{} is not a valid header value", what)))
}

impl AppleMusicClient {
    pub fn new(
        credentials: AppleMusicCredentials,
        storefront: &str,
        locale: &str,
        timeout: Duration,
    ) -> Result<Self, CatalogError> {
        Self::with_base_url(
            credentials,
            APPLE_MUSIC_API_BASE,
            storefront,
            locale,
            timeout,
        )
    }

    pub fn with_base_url(
        credentials: AppleMusicCredentials,
        base_url: &str,
        storefront: &str,
        locale: &str,
        timeout: Duration,
    ) -> Result<Self, CatalogError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            header_value(
                &format!("Bearer {}", credentials.developer_token),
                "developer token",
            )?,
        );
        headers.insert(
            "Music-User-Token",
            header_value(&credentials.user_token, "user token")?,
        );
        headers.insert(ORIGIN, HeaderValue::from_static(APPLE_MUSIC_WEB_ORIGIN));
        headers.insert(REFERER, HeaderValue::from_static(APPLE_MUSIC_WEB_ORIGIN));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            storefront: storefront.to_string(),
            locale: locale.to_string(),
        })
    }

    fn catalog_filter<A: serde::de::DeserializeOwned>(
        &self,
        kind: &str,
        filter: &str,
        codes: &[String],
    ) -> Result<DataResponse<A>, CatalogError> {
        let url = format!("{}/v1/catalog/{}/{}", self.base_url, self.storefront, kind);
        debug!("Looking up {} {} by {}", codes.len(), kind, filter);
        let response = self
            .client
            .get(&url)
            .query(&[(format!("filter[{}]", filter), codes.join(","))])
            .send()?;
        read_json(response)
    }
}

impl TargetCatalog for AppleMusicClient {
    fn songs_by_isrc(&self, isrcs: &[String]) -> Result<Vec<TargetSong>, CatalogError> {
        if isrcs.is_empty() {
            return Ok(Vec::new());
        }
        let response = self.catalog_filter("songs", "isrc", isrcs)?;
        Ok(songs_from_response(response))
    }

    fn albums_by_upc(&self, upcs: &[String]) -> Result<Vec<TargetAlbum>, CatalogError> {
        if upcs.is_empty() {
            return Ok(Vec::new());
        }
        let response = self.catalog_filter("albums", "upc", upcs)?;
        Ok(albums_from_response(response))
    }

    fn create_folder(&self, name: &str) -> Result<String, CatalogError> {
        let url = format!("{}/v1/me/library/playlist-folders", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&CreateFolderBody {
                attributes: NameAttributes { name },
            })
            .send()?;
        created_id(read_json(response)?)
    }

    fn create_playlist(&self, playlist: &NewPlaylist) -> Result<String, CatalogError> {
        let url = format!("{}/v1/me/library/playlists", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("art[url]", "f"), ("l", self.locale.as_str())])
            .json(&playlist_body(playlist))
            .send()?;
        created_id(read_json(response)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_http::parse_json;

    #[test]
    fn test_songs_response_skips_entries_without_isrc() {
        let body = r#"{"data":[
            {"id":"1440857781","type":"songs","attributes":{"name":"Song A","artistName":"Artist","isrc":"usrc17607839"}},
            {"id":"1440857782","type":"songs","attributes":{"name":"No ISRC","artistName":"Artist"}},
            {"id":"1440857783","type":"songs"}
        ]}"#;
        let songs = songs_from_response(parse_json(body).unwrap());
        assert_eq!(
            songs,
            vec![TargetSong {
                id: "1440857781".to_string(),
                name: "Song A".to_string(),
                artist_name: "Artist".to_string(),
                isrc: "USRC17607839".to_string(),
            }]
        );
    }

    #[test]
    fn test_empty_lookup_response() {
        let songs = songs_from_response(parse_json("{}").unwrap());
        assert!(songs.is_empty());
    }

    #[test]
    fn test_albums_response() {
        let body = r#"{"data":[{"id":"617154241","type":"albums","attributes":{"name":"Album","artistName":"Band","upc":"00602537518357"}}]}"#;
        let albums = albums_from_response(parse_json(body).unwrap());
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].id, "617154241");
        assert_eq!(albums[0].upc, "00602537518357");
    }

    #[test]
    fn test_created_id() {
        let body = r#"{"data":[{"id":"p.QvDQE5RIVbzeb5","type":"library-playlists","href":"/v1/me/library/playlists/p.QvDQE5RIVbzeb5"}]}"#;
        assert_eq!(created_id(parse_json(body).unwrap()).unwrap(), "p.QvDQE5RIVbzeb5");

        let empty = created_id(parse_json(r#"{"data":[]}"#).unwrap());
        assert!(matches!(empty, Err(CatalogError::Decode(_))));
    }

    #[test]
    fn test_playlist_body_shape() {
        let playlist = NewPlaylist {
            name: "Road Trip".to_string(),
            description: "Imported".to_string(),
            is_public: false,
            parent_folder_id: "p.folder".to_string(),
            track_ids: vec!["1".to_string(), "2".to_string()],
        };
        let json = serde_json::to_value(playlist_body(&playlist)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "attributes": {"name": "Road Trip", "description": "Imported", "isPublic": false},
                "relationships": {
                    "tracks": {"data": [{"id": "1", "type": "songs"}, {"id": "2", "type": "songs"}]},
                    "parent": {"data": [{"id": "p.folder", "type": "library-playlist-folders"}]}
                }
            })
        );
    }

    #[test]
    fn test_rejects_token_with_newline() {
        let credentials = AppleMusicCredentials {
            developer_token: "dev".to_string(),
            user_token: "bad\ntoken".to_string(),
        };
        let result = AppleMusicClient::new(credentials, "us", "en-US", Duration::from_secs(5));
        assert!(matches!(result, Err(CatalogError::Auth(_))));
    }
}
