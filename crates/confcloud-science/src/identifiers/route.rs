use std::collections::BTreeSet;

use confcloud_core::Paper;

use super::{Doi, ProceedingsRef, extract_openreview_id};
use crate::enrichment::TierId;

/// One usable identifier of a paper and the tiers that consume it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierRoute {
    /// Forum id known (given or parsed from the OpenReview URL).
    OpenReviewId(String),
    /// OpenReview URL that does not point at a forum; the id must be
    /// recovered by title search first.
    OpenReviewUrlNoId(String),
    Doi(Doi),
    Proceedings(ProceedingsRef),
    None,
}

impl IdentifierRoute {
    /// The highest-precedence identifier of `paper`.
    pub fn of(paper: &Paper) -> Self {
        RouteSet::of(paper)
            .primary()
            .cloned()
            .unwrap_or(Self::None)
    }

    /// Tiers that consume this identifier, in run order.
    pub fn tiers(&self) -> &'static [TierId] {
        match self {
            Self::OpenReviewId(_) => &[TierId::OpenReviewFetch],
            Self::OpenReviewUrlNoId(_) => &[TierId::OpenReviewSearch, TierId::OpenReviewFetch],
            Self::Doi(_) => &[TierId::BatchDoi, TierId::SingleDoi],
            Self::Proceedings(_) => &[TierId::Proceedings],
            Self::None => &[],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OpenReviewId(_) => "openreview_id",
            Self::OpenReviewUrlNoId(_) => "openreview_url",
            Self::Doi(_) => "doi",
            Self::Proceedings(_) => "proceedings",
            Self::None => "none",
        }
    }
}

/// Every usable identifier of one paper, highest precedence first. Parsed
/// once per run; the paper is eligible for the union of their tiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteSet {
    routes: Vec<IdentifierRoute>,
}

impl RouteSet {
    pub fn of(paper: &Paper) -> Self {
        let mut routes = Vec::new();

        let openreview_id = paper
            .openreview_id
            .clone()
            .or_else(|| paper.openreview_url.as_deref().and_then(extract_openreview_id));
        match (openreview_id, &paper.openreview_url) {
            (Some(id), _) => routes.push(IdentifierRoute::OpenReviewId(id)),
            (None, Some(url)) => routes.push(IdentifierRoute::OpenReviewUrlNoId(url.clone())),
            (None, None) => {}
        }
        if let Some(doi) = paper.doi.as_deref().and_then(|raw| Doi::parse(raw).ok()) {
            routes.push(IdentifierRoute::Doi(doi));
        }
        if let Some(proceedings) = ProceedingsRef::from_paper(paper) {
            routes.push(IdentifierRoute::Proceedings(proceedings));
        }

        Self { routes }
    }

    pub fn routes(&self) -> &[IdentifierRoute] {
        &self.routes
    }

    pub fn primary(&self) -> Option<&IdentifierRoute> {
        self.routes.first()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn tiers(&self) -> BTreeSet<TierId> {
        self.routes
            .iter()
            .flat_map(|route| route.tiers().iter().copied())
            .collect()
    }

    pub fn serves(&self, tier: TierId) -> bool {
        self.routes.iter().any(|route| route.tiers().contains(&tier))
    }

    pub fn forum_id(&self) -> Option<&str> {
        self.routes.iter().find_map(|route| match route {
            IdentifierRoute::OpenReviewId(id) => Some(id.as_str()),
            _ => None,
        })
    }

    /// True while the OpenReview URL has no forum id.
    pub fn needs_title_search(&self) -> bool {
        self.routes
            .iter()
            .any(|route| matches!(route, IdentifierRoute::OpenReviewUrlNoId(_)))
    }

    pub fn doi(&self) -> Option<&Doi> {
        self.routes.iter().find_map(|route| match route {
            IdentifierRoute::Doi(doi) => Some(doi),
            _ => None,
        })
    }

    pub fn proceedings(&self) -> Option<&ProceedingsRef> {
        self.routes.iter().find_map(|route| match route {
            IdentifierRoute::Proceedings(reference) => Some(reference),
            _ => None,
        })
    }

    /// A forum id recovered by title search replaces the id-less URL.
    pub fn set_forum_id(&mut self, forum_id: impl Into<String>) {
        let route = IdentifierRoute::OpenReviewId(forum_id.into());
        let slot = self.routes.iter().position(|existing| {
            matches!(
                existing,
                IdentifierRoute::OpenReviewId(_) | IdentifierRoute::OpenReviewUrlNoId(_)
            )
        });
        match slot {
            Some(i) => self.routes[i] = route,
            None => self.routes.insert(0, route),
        }
    }

    pub fn without_proceedings(mut self) -> Self {
        self.routes
            .retain(|route| !matches!(route, IdentifierRoute::Proceedings(_)));
        self
    }
}

impl From<IdentifierRoute> for RouteSet {
    fn from(route: IdentifierRoute) -> Self {
        let routes = match route {
            IdentifierRoute::None => Vec::new(),
            route => vec![route],
        };
        Self { routes }
    }
}

/// Tiers a paper is eligible for: every tier one of its identifiers feeds.
/// Empty once it has an abstract.
pub fn classify(paper: &Paper) -> BTreeSet<TierId> {
    if paper.has_abstract() {
        return BTreeSet::new();
    }
    RouteSet::of(paper).tiers()
}

#[cfg(test)]
mod tests {
    use confcloud_core::Enrichment;

    use super::*;

    fn paper() -> Paper {
        Paper::new("A Paper", 2022)
    }

    #[test]
    fn doi_paper_routes_to_doi_tiers() {
        let mut p = paper();
        p.doi = Some("https://doi.org/10.1145/3580305.3599000".to_string());
        assert!(matches!(IdentifierRoute::of(&p), IdentifierRoute::Doi(_)));
        assert_eq!(
            classify(&p),
            BTreeSet::from([TierId::BatchDoi, TierId::SingleDoi])
        );
    }

    #[test]
    fn forum_url_routes_to_fetch_only() {
        let mut p = paper();
        p.openreview_url = Some("https://openreview.net/forum?id=abc123".to_string());
        assert_eq!(
            IdentifierRoute::of(&p),
            IdentifierRoute::OpenReviewId("abc123".to_string())
        );
        assert_eq!(classify(&p), BTreeSet::from([TierId::OpenReviewFetch]));
    }

    #[test]
    fn listing_url_needs_title_search() {
        let mut p = paper();
        p.openreview_url = Some("https://openreview.net/group?id=ICLR.cc/2022/Conference".to_string());
        assert!(matches!(
            IdentifierRoute::of(&p),
            IdentifierRoute::OpenReviewUrlNoId(_)
        ));
        assert_eq!(
            classify(&p),
            BTreeSet::from([TierId::OpenReviewSearch, TierId::OpenReviewFetch])
        );
    }

    #[test]
    fn proceedings_url_routes_to_proceedings() {
        let mut p = paper();
        p.proceedings_url = Some(
            "https://proceedings.neurips.cc/paper_files/paper/2022/hash/002262941c9edfd472a79298b2ac5e17-Abstract-Conference.html"
                .to_string(),
        );
        assert_eq!(classify(&p), BTreeSet::from([TierId::Proceedings]));
    }

    #[test]
    fn openreview_wins_over_doi() {
        let mut p = paper();
        p.doi = Some("10.1145/1".to_string());
        p.openreview_id = Some("xyz".to_string());
        assert_eq!(IdentifierRoute::of(&p).label(), "openreview_id");
    }

    #[test]
    fn every_identifier_contributes_tiers() {
        let mut p = paper();
        p.doi = Some("10.1145/1".to_string());
        p.openreview_url = Some("https://openreview.net/forum?id=xyz".to_string());
        assert_eq!(
            classify(&p),
            BTreeSet::from([TierId::OpenReviewFetch, TierId::BatchDoi, TierId::SingleDoi])
        );

        let routes = RouteSet::of(&p);
        assert_eq!(routes.forum_id(), Some("xyz"));
        assert_eq!(routes.doi().map(|d| d.normalized.as_str()), Some("10.1145/1"));
        assert!(!routes.needs_title_search());
    }

    #[test]
    fn recovered_forum_id_replaces_listing_url() {
        let mut p = paper();
        p.doi = Some("10.1145/1".to_string());
        p.openreview_url = Some("https://openreview.net/group?id=ICLR.cc/2022/Conference".to_string());

        let mut routes = RouteSet::of(&p);
        assert!(routes.needs_title_search());
        routes.set_forum_id("found");
        assert!(!routes.needs_title_search());
        assert_eq!(routes.forum_id(), Some("found"));
        assert_eq!(routes.routes().len(), 2);
        assert!(routes.serves(TierId::BatchDoi));
        assert!(!routes.serves(TierId::OpenReviewSearch));
    }

    #[test]
    fn unusable_identifiers_route_nowhere() {
        let mut p = paper();
        assert_eq!(IdentifierRoute::of(&p), IdentifierRoute::None);
        p.doi = Some("not a doi".to_string());
        p.proceedings_url = Some("https://proceedings.neurips.cc/paper/2022".to_string());
        assert_eq!(IdentifierRoute::of(&p), IdentifierRoute::None);
        assert!(classify(&p).is_empty());
    }

    #[test]
    fn resolved_paper_is_eligible_for_nothing() {
        let mut p = paper();
        p.doi = Some("10.1145/1".to_string());
        p.apply_enrichment(Enrichment {
            abstract_text: Some("Known.".to_string()),
            ..Default::default()
        });
        assert!(classify(&p).is_empty());
    }
}
