// Music catalog resolution: tracks to artists, artists to images.
//
// The network side sits behind the CatalogApi trait (SpotifyClient in
// production); bunching and retry rounds are provider-agnostic.

pub mod client;
pub mod models;
pub mod resolver;
pub mod rounds;
