//! Named AniList GraphQL operations.
//!
//! Documents are sent as-is; the client never inspects them.

/// A named GraphQL document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub name: &'static str,
    pub document: &'static str,
}

pub const SEARCH_MEDIA: Operation = Operation {
    name: "SearchMedia",
    document: r"
query SearchMedia($page: Int, $perPage: Int, $search: String, $sort: [MediaSort],
                  $type: MediaType, $genre_in: [String], $tag_in: [String],
                  $season: MediaSeason, $seasonYear: Int, $status: MediaStatus,
                  $format: MediaFormat, $averageScore_greater: Int) {
  Page(page: $page, perPage: $perPage) {
    pageInfo { total currentPage lastPage hasNextPage perPage }
    media(search: $search, sort: $sort, type: $type, genre_in: $genre_in,
          tag_in: $tag_in, season: $season, seasonYear: $seasonYear,
          status: $status, format: $format,
          averageScore_greater: $averageScore_greater) {
      id
      title { romaji english native }
      description(asHtml: false)
      coverImage { large medium }
      bannerImage
      genres
      tags { name rank }
      studios { nodes { name } }
      episodes duration status season seasonYear
      averageScore popularity trending format source
      startDate { year month day }
      nextAiringEpisode { episode timeUntilAiring airingAt }
      siteUrl
    }
  }
}",
};

pub const CHARACTER: Operation = Operation {
    name: "Character",
    document: r"
query Character($id: Int, $search: String) {
  Character(id: $id, search: $search) {
    id
    name { full native alternative }
    image { large medium }
    description
    gender
    dateOfBirth { year month day }
    age
    favourites
    siteUrl
    media(page: 1, perPage: 10) {
      nodes { id title { english romaji } type coverImage { large } }
      edges {
        characterRole
        voiceActors(language: JAPANESE) { id name { full } image { medium } }
      }
    }
  }
}",
};

pub const USER_LIST: Operation = Operation {
    name: "MediaListCollection",
    document: r"
query MediaListCollection($userId: Int, $userName: String, $type: MediaType,
                          $status: MediaListStatus, $sort: [MediaListSort]) {
  MediaListCollection(userId: $userId, userName: $userName, type: $type,
                      status: $status, sort: $sort) {
    user { id name avatar { large } }
    lists {
      name
      status
      entries {
        id score progress status repeat
        media { id title { english romaji } coverImage { large } episodes averageScore }
        startedAt { year month day }
        completedAt { year month day }
      }
    }
  }
}",
};

pub const RECOMMENDATIONS: Operation = Operation {
    name: "Recommendations",
    document: r"
query Recommendations($id: Int!, $perPage: Int) {
  Media(id: $id) {
    id
    title { english romaji }
    recommendations(page: 1, perPage: $perPage, sort: RATING_DESC) {
      nodes {
        id rating userRating
        mediaRecommendation {
          id title { english romaji } coverImage { large } averageScore genres
        }
      }
    }
  }
}",
};

/// Identity of the token bearer.
pub const VIEWER: Operation = Operation {
    name: "Viewer",
    document: r"
query Viewer {
  Viewer { id name }
}",
};
