//! Identifier matching between local songs and provider tracks.
//!
//! Resolution order, first hit wins:
//! 1. a remote track id recorded by an earlier sync (among the candidates, or
//!    resolved through the provider's track lookup),
//! 2. the ISRC fingerprint (among the candidates, or through a provider-wide
//!    ISRC search),
//! 3. a normalized fuzzy comparison of title and artist.
//!
//! A song costs at most one provider search per pass. Nothing is cached
//! between passes since the remote catalog can change underneath us.

use std::sync::LazyLock;

use regex::Regex;
use unaccent::unaccent;

use crate::ports::provider::{ProviderError, ProviderTrack, SearchQuery};
use crate::sync::error::{Result, SyncError};
use crate::sync::remote::{CallError, RemoteContext};
use crate::sync::types::{LocalSong, MatchResult, MatchTier, RemoteTrackRef};

/// Minimum combined similarity for a fuzzy match to be accepted.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.88;

const TITLE_WEIGHT: f64 = 0.6;
const ARTIST_WEIGHT: f64 = 0.4;

pub const NO_CONFIDENT_MATCH: &str = "no confident match";

static VERSION_PARENTHETICAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\s*[\(\[][^\)\]]*\b(remaster(ed)?|radio edit|radio version|single version|album version|mono|stereo|deluxe|bonus track|live|edit|version|feat\.?|ft\.?|featuring|with)\b[^\)\]]*[\)\]]",
    )
    .expect("version parenthetical pattern is valid")
});

static VERSION_DASH_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\s+-\s+[^-]*\b(remaster(ed)?|radio edit|radio version|single version|album version|mono|stereo|live|edit|version|mix)\b.*$",
    )
    .expect("version suffix pattern is valid")
});

static FEATURING_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+(feat\.?|ft\.?|featuring)\s+.*$").expect("featuring pattern is valid")
});

static ARTIST_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*(,|&|;|\bfeat\.?|\bft\.?|\bfeaturing\b|\bx\b)\s*")
        .expect("artist separator pattern is valid")
});

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s]+").expect("punctuation pattern is valid"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

fn strip_punctuation(s: &str) -> String {
    let without_apostrophes = s.replace(['\'', '’'], "");
    let no_punct = PUNCTUATION.replace_all(&without_apostrophes, " ");
    WHITESPACE.replace_all(no_punct.trim(), " ").to_string()
}

/// Normalizes a title for comparison: accents, case, version suffixes such as
/// "(Remastered 2011)" or "- Radio Edit", featuring credits and punctuation.
pub fn normalize_title(title: &str) -> String {
    let lower = unaccent(title).to_lowercase();
    let without_parens = VERSION_PARENTHETICAL.replace_all(&lower, "");
    let without_dash = VERSION_DASH_SUFFIX.replace(&without_parens, "");
    let without_feat = FEATURING_SUFFIX.replace(&without_dash, "");
    strip_punctuation(&without_feat)
}

/// Normalizes an artist credit down to its primary artist.
pub fn normalize_artist(artist: &str) -> String {
    let lower = unaccent(artist).to_lowercase();
    let primary = ARTIST_SEPARATOR
        .split(lower.trim())
        .find(|part| !part.trim().is_empty())
        .unwrap_or_default();
    let primary = primary.trim();
    let primary = primary.strip_prefix("the ").unwrap_or(primary);
    strip_punctuation(primary)
}

/// Combined title/artist similarity in `[0, 1]`.
pub fn fuzzy_score(song: &LocalSong, title: &str, artist: &str) -> f64 {
    let title_sim = jaro_winkler::jaro_winkler(&normalize_title(&song.title), &normalize_title(title));

    let local_artist = normalize_artist(&song.artist);
    let remote_artist = normalize_artist(artist);
    if local_artist.is_empty() || remote_artist.is_empty() {
        return title_sim;
    }

    let artist_sim = jaro_winkler::jaro_winkler(&local_artist, &remote_artist);
    TITLE_WEIGHT * title_sim + ARTIST_WEIGHT * artist_sim
}

fn same_isrc(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

pub fn find_by_provider_id<'a>(
    song: &LocalSong,
    provider_name: &str,
    candidates: &'a [RemoteTrackRef],
) -> Option<&'a RemoteTrackRef> {
    let recorded = song.external_id(provider_name)?;
    candidates.iter().find(|c| c.track_id == recorded)
}

pub fn find_by_fingerprint<'a>(
    song: &LocalSong,
    candidates: &'a [RemoteTrackRef],
) -> Option<&'a RemoteTrackRef> {
    let isrc = song.isrc.as_deref()?;
    candidates
        .iter()
        .find(|c| c.isrc.as_deref().is_some_and(|other| same_isrc(isrc, other)))
}

/// Best scoring `(track id, score)` among `tracks`; earlier entries win ties.
pub fn best_fuzzy<'a, I>(song: &LocalSong, tracks: I) -> Option<(&'a str, f64)>
where
    I: IntoIterator<Item = (&'a str, &'a str, &'a str)>,
{
    let mut best: Option<(&'a str, f64)> = None;
    for (track_id, title, artist) in tracks {
        let score = fuzzy_score(song, title, artist);
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((track_id, score));
        }
    }
    best
}

/// Resolves local songs against the remote catalog for one pass.
pub struct Matcher<'a> {
    ctx: &'a RemoteContext,
    threshold: f64,
}

impl<'a> Matcher<'a> {
    pub fn new(ctx: &'a RemoteContext, threshold: f64) -> Self {
        Self { ctx, threshold }
    }

    /// Matches one song against the current remote playlist entries.
    ///
    /// Only a rejected credential or an interrupted pass is an error; other
    /// provider failures during lookup or search degrade to the next tier.
    pub async fn match_song(
        &self,
        song: &LocalSong,
        candidates: &[RemoteTrackRef],
    ) -> Result<MatchResult> {
        let provider_name = self.ctx.provider_name();

        if let Some(found) = find_by_provider_id(song, provider_name, candidates) {
            return Ok(MatchResult::matched(&found.track_id, MatchTier::ExactProviderId));
        }

        if let Some(recorded) = song.external_id(provider_name) {
            let lookup = self
                .ctx
                .call_once(self.ctx.provider().get_track(self.ctx.credential(), recorded))
                .await;
            match lookup {
                Ok(Some(track)) => {
                    return Ok(MatchResult::matched(track.id, MatchTier::ExactProviderId));
                }
                Ok(None) | Err(CallError::Provider(ProviderError::NotFound)) => {
                    tracing::debug!(song_id = song.id, recorded, "Recorded remote id no longer resolves");
                }
                Err(e) => {
                    degrade(song, e, "Track lookup failed, falling back")?;
                }
            }
        }

        if let Some(found) = find_by_fingerprint(song, candidates) {
            return Ok(MatchResult::matched(&found.track_id, MatchTier::ExactFingerprint));
        }

        let query = match &song.isrc {
            Some(isrc) => SearchQuery::Isrc(isrc.clone()),
            None => SearchQuery::TitleArtist {
                title: song.title.clone(),
                artist: song.artist.clone(),
            },
        };

        // An ISRC search outranks any fuzzy result, so a confident candidate
        // only short-circuits the search for songs without a fingerprint.
        let candidate_best = best_fuzzy(
            song,
            candidates
                .iter()
                .map(|c| (c.track_id.as_str(), c.title.as_str(), c.artist.as_str())),
        )
        .filter(|(_, score)| *score >= self.threshold);

        if candidate_best.is_some() && song.isrc.is_none() {
            return Ok(self.fuzzy_result(candidate_best));
        }

        let search_results = self.search_once(song, &query).await?;

        if let Some(isrc) = song.isrc.as_deref() {
            let fingerprint_hit = search_results
                .iter()
                .find(|t| t.isrc.as_deref().is_some_and(|other| same_isrc(isrc, other)));
            if let Some(track) = fingerprint_hit {
                return Ok(MatchResult::matched(&track.id, MatchTier::ExactFingerprint));
            }
            if candidate_best.is_some() {
                return Ok(self.fuzzy_result(candidate_best));
            }
        }

        let search_best = best_fuzzy(
            song,
            search_results
                .iter()
                .map(|t| (t.id.as_str(), t.title.as_str(), t.artist.as_str())),
        )
        .filter(|(_, score)| *score >= self.threshold);

        Ok(self.fuzzy_result(search_best))
    }

    fn fuzzy_result(&self, best: Option<(&str, f64)>) -> MatchResult {
        match best {
            Some((track_id, score)) => {
                MatchResult::matched(track_id, MatchTier::FuzzyTitleArtist(score))
            }
            None => MatchResult::unmatched(NO_CONFIDENT_MATCH),
        }
    }

    async fn search_once(&self, song: &LocalSong, query: &SearchQuery) -> Result<Vec<ProviderTrack>> {
        let search = self
            .ctx
            .call_once(self.ctx.provider().search_tracks(self.ctx.credential(), query))
            .await;
        match search {
            Ok(results) => Ok(results),
            Err(e) => {
                degrade(song, e, "Provider search failed")?;
                Ok(Vec::new())
            }
        }
    }
}

/// Turns a failed lookup into a pass-level error when it has to abort the pass.
fn degrade(song: &LocalSong, error: CallError, message: &str) -> Result<()> {
    match error {
        CallError::Provider(ProviderError::Unauthorized) => Err(SyncError::Auth),
        CallError::Cancelled | CallError::DeadlineElapsed => Err(SyncError::Cancelled),
        CallError::Provider(e) => {
            tracing::warn!(song_id = song.id, error = %e, "{}", message);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use std::sync::Arc;

    use super::*;
    use crate::ports::provider::MockPlaylistProvider;
    use crate::test_utils::remote_context;

    fn song(id: i64, title: &str, artist: &str) -> LocalSong {
        LocalSong {
            id,
            title: title.into(),
            artist: artist.into(),
            album: None,
            external_ids: HashMap::new(),
            isrc: None,
        }
    }

    fn remote(track_id: &str, title: &str, artist: &str, position: usize) -> RemoteTrackRef {
        RemoteTrackRef {
            track_id: track_id.into(),
            title: title.into(),
            artist: artist.into(),
            position,
            isrc: None,
        }
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("Hey Jude (Remastered 2015)"), "hey jude");
        assert_eq!(normalize_title("Hey Jude - Remastered 2009"), "hey jude");
        assert_eq!(normalize_title("Sunflower - Radio Edit"), "sunflower");
        assert_eq!(normalize_title("Don't Stop Me Now"), "dont stop me now");
        assert_eq!(normalize_title("Café del Mar"), "cafe del mar");
        assert_eq!(normalize_title("Señorita (feat. Someone)"), "senorita");
        assert_eq!(normalize_title("Stay feat. Justin Bieber"), "stay");
    }

    #[test]
    fn test_normalize_title_keeps_meaningful_dash() {
        assert_eq!(normalize_title("Part One - Part Two"), "part one part two");
    }

    #[test]
    fn test_normalize_artist() {
        assert_eq!(normalize_artist("The Beatles"), "beatles");
        assert_eq!(normalize_artist("Daft Punk, Pharrell Williams"), "daft punk");
        assert_eq!(normalize_artist("Simon & Garfunkel"), "simon");
        assert_eq!(normalize_artist("Beyoncé feat. JAY-Z"), "beyonce");
    }

    #[test]
    fn test_fuzzy_score_tolerates_version_suffix() {
        let local = song(1, "Bohemian Rhapsody", "Queen");
        let score = fuzzy_score(&local, "Bohemian Rhapsody - Remastered 2011", "Queen");
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_fuzzy_score_rejects_different_song() {
        let local = song(1, "Bohemian Rhapsody", "Queen");
        let score = fuzzy_score(&local, "Yellow Submarine", "The Beatles");
        assert!(score < DEFAULT_FUZZY_THRESHOLD);
    }

    #[test]
    fn test_best_fuzzy_prefers_earlier_on_tie() {
        let local = song(1, "Song", "Artist");
        let best = best_fuzzy(&local, [("a", "Song", "Artist"), ("b", "Song", "Artist")]);
        assert_eq!(best.map(|(id, _)| id), Some("a"));
    }

    #[tokio::test]
    async fn test_exact_provider_id_among_candidates() {
        let provider = MockPlaylistProvider::new();
        let mut local = song(1, "Anything", "Anyone");
        local.external_ids.insert("spotify".into(), "R1".into());
        let candidates = vec![remote("R1", "Other title", "Other artist", 0)];

        let ctx = remote_context(Arc::new(provider));
        let matcher = Matcher::new(&ctx, DEFAULT_FUZZY_THRESHOLD);
        let result = matcher.match_song(&local, &candidates).await.unwrap();

        assert_eq!(result, MatchResult::matched("R1", MatchTier::ExactProviderId));
    }

    #[tokio::test]
    async fn test_exact_provider_id_through_lookup() {
        let mut provider = MockPlaylistProvider::new();
        provider
            .expect_get_track()
            .withf(|_, id| id == "R9")
            .times(1)
            .returning(|_, id| {
                Ok(Some(ProviderTrack {
                    id: id.to_string(),
                    title: "Song".into(),
                    artist: "Artist".into(),
                    isrc: None,
                }))
            });
        provider.expect_search_tracks().never();

        let mut local = song(1, "Song", "Artist");
        local.external_ids.insert("spotify".into(), "R9".into());

        let ctx = remote_context(Arc::new(provider));
        let matcher = Matcher::new(&ctx, DEFAULT_FUZZY_THRESHOLD);
        let result = matcher.match_song(&local, &[]).await.unwrap();

        assert_eq!(result, MatchResult::matched("R9", MatchTier::ExactProviderId));
    }

    #[tokio::test]
    async fn test_fingerprint_among_candidates() {
        let provider = MockPlaylistProvider::new();
        let mut local = song(1, "Totally different", "Name");
        local.isrc = Some("usrc17607839".into());
        let mut candidate = remote("R2", "Song", "Artist", 0);
        candidate.isrc = Some("USRC17607839".into());

        let ctx = remote_context(Arc::new(provider));
        let matcher = Matcher::new(&ctx, DEFAULT_FUZZY_THRESHOLD);
        let result = matcher.match_song(&local, &[candidate]).await.unwrap();

        assert_eq!(result, MatchResult::matched("R2", MatchTier::ExactFingerprint));
    }

    #[tokio::test]
    async fn test_fingerprint_through_single_search() {
        let mut provider = MockPlaylistProvider::new();
        provider
            .expect_search_tracks()
            .withf(|_, query| *query == SearchQuery::Isrc("GBAYE0601498".into()))
            .times(1)
            .returning(|_, _| {
                Ok(vec![ProviderTrack {
                    id: "R7".into(),
                    title: "Song".into(),
                    artist: "Artist".into(),
                    isrc: Some("GBAYE0601498".into()),
                }])
            });

        let mut local = song(1, "Song", "Artist");
        local.isrc = Some("GBAYE0601498".into());

        let ctx = remote_context(Arc::new(provider));
        let matcher = Matcher::new(&ctx, DEFAULT_FUZZY_THRESHOLD);
        let result = matcher.match_song(&local, &[]).await.unwrap();

        assert_eq!(result, MatchResult::matched("R7", MatchTier::ExactFingerprint));
    }

    #[tokio::test]
    async fn test_search_result_without_isrc_is_not_a_fingerprint_hit() {
        let mut provider = MockPlaylistProvider::new();
        provider.expect_search_tracks().times(1).returning(|_, _| {
            Ok(vec![
                ProviderTrack {
                    id: "R3".into(),
                    title: "Unrelated".into(),
                    artist: "Someone".into(),
                    isrc: None,
                },
                ProviderTrack {
                    id: "R4".into(),
                    title: "Song".into(),
                    artist: "Artist".into(),
                    isrc: None,
                },
            ])
        });

        let mut local = song(1, "Song", "Artist");
        local.isrc = Some("GBAYE0601498".into());

        let ctx = remote_context(Arc::new(provider));
        let matcher = Matcher::new(&ctx, DEFAULT_FUZZY_THRESHOLD);
        let result = matcher.match_song(&local, &[]).await.unwrap();

        assert!(matches!(
            result,
            MatchResult::Matched {
                ref track_id,
                tier: MatchTier::FuzzyTitleArtist(_),
            } if track_id == "R4"
        ));
    }

    #[tokio::test]
    async fn test_fuzzy_candidate_skips_search() {
        let mut provider = MockPlaylistProvider::new();
        provider.expect_search_tracks().never();

        let local = song(1, "Hey Jude", "The Beatles");
        let candidates = vec![
            remote("R1", "Let It Be", "The Beatles", 0),
            remote("R2", "Hey Jude - Remastered 2015", "The Beatles", 1),
        ];

        let ctx = remote_context(Arc::new(provider));
        let matcher = Matcher::new(&ctx, DEFAULT_FUZZY_THRESHOLD);
        let result = matcher.match_song(&local, &candidates).await.unwrap();

        match result {
            MatchResult::Matched {
                track_id,
                tier: MatchTier::FuzzyTitleArtist(score),
            } => {
                assert_eq!(track_id, "R2");
                assert!(score >= DEFAULT_FUZZY_THRESHOLD);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fuzzy_falls_back_to_search() {
        let mut provider = MockPlaylistProvider::new();
        provider.expect_search_tracks().times(1).returning(|_, _| {
            Ok(vec![ProviderTrack {
                id: "S1".into(),
                title: "Wonderwall - Remastered".into(),
                artist: "Oasis".into(),
                isrc: None,
            }])
        });

        let local = song(1, "Wonderwall", "Oasis");

        let ctx = remote_context(Arc::new(provider));
        let matcher = Matcher::new(&ctx, DEFAULT_FUZZY_THRESHOLD);
        let result = matcher.match_song(&local, &[]).await.unwrap();

        assert!(matches!(result, MatchResult::Matched { ref track_id, .. } if track_id == "S1"));
    }

    #[tokio::test]
    async fn test_no_confident_match() {
        let mut provider = MockPlaylistProvider::new();
        provider.expect_search_tracks().times(1).returning(|_, _| {
            Ok(vec![ProviderTrack {
                id: "S1".into(),
                title: "Completely Unrelated".into(),
                artist: "Somebody Else".into(),
                isrc: None,
            }])
        });

        let local = song(1, "Wonderwall", "Oasis");

        let ctx = remote_context(Arc::new(provider));
        let matcher = Matcher::new(&ctx, DEFAULT_FUZZY_THRESHOLD);
        let result = matcher.match_song(&local, &[]).await.unwrap();

        assert_eq!(result, MatchResult::unmatched(NO_CONFIDENT_MATCH));
    }

    #[tokio::test]
    async fn test_search_failure_degrades_to_unmatched() {
        let mut provider = MockPlaylistProvider::new();
        provider
            .expect_search_tracks()
            .times(1)
            .returning(|_, _| Err(ProviderError::Server { status: 502 }));

        let local = song(1, "Wonderwall", "Oasis");

        let ctx = remote_context(Arc::new(provider));
        let matcher = Matcher::new(&ctx, DEFAULT_FUZZY_THRESHOLD);
        let result = matcher.match_song(&local, &[]).await.unwrap();

        assert_eq!(result, MatchResult::unmatched(NO_CONFIDENT_MATCH));
    }

    #[tokio::test]
    async fn test_unauthorized_search_is_auth_error() {
        let mut provider = MockPlaylistProvider::new();
        provider
            .expect_search_tracks()
            .returning(|_, _| Err(ProviderError::Unauthorized));

        let local = song(1, "Wonderwall", "Oasis");

        let ctx = remote_context(Arc::new(provider));
        let matcher = Matcher::new(&ctx, DEFAULT_FUZZY_THRESHOLD);
        let result = matcher.match_song(&local, &[]).await;

        assert_eq!(result, Err(SyncError::Auth));
    }
}
