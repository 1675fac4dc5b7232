use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A completed HTTP exchange as handed back by the fetch layer.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
    /// Content-Length when the server sent one, otherwise the body length.
    pub size: u64,
    pub latency: Duration,
}

impl RawResponse {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            url: url.into(),
            status,
            size: body.len() as u64,
            body,
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Bytes per second for this exchange.
    pub fn throughput(&self) -> f64 {
        let secs = self.latency.as_secs_f64();
        if secs > 0.0 {
            self.size as f64 / secs
        } else {
            0.0
        }
    }
}

/// An app listing from the search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub category_id: i64,
    pub category: String,
    pub price: f64,
    pub developer_id: i64,
    pub developer: String,
    pub rating: f64,
    /// Number of user ratings.
    pub ratings: i64,
    pub released: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingWire {
    track_id: i64,
    track_name: String,
    #[serde(default)]
    description: String,
    primary_genre_id: i64,
    primary_genre_name: String,
    #[serde(default)]
    price: f64,
    artist_id: i64,
    artist_name: String,
    #[serde(default)]
    average_user_rating: f64,
    #[serde(default)]
    user_rating_count: i64,
    release_date: Option<DateTime<Utc>>,
}

impl App {
    /// Parse one element of a search response's `results` array.
    pub fn from_listing(value: &serde_json::Value) -> Result<Self, AppError> {
        let wire = ListingWire::deserialize(value)?;
        Ok(Self {
            id: wire.track_id,
            name: wire.track_name,
            description: wire.description.trim().to_string(),
            category_id: wire.primary_genre_id,
            category: wire.primary_genre_name,
            price: wire.price,
            developer_id: wire.artist_id,
            developer: wire.artist_name,
            rating: wire.average_user_rating,
            ratings: wire.user_rating_count,
            released: wire.release_date,
        })
    }
}

/// Identifies an app to look up ratings or reviews for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRef {
    pub id: i64,
    pub name: String,
    pub category_id: i64,
    pub category: String,
}

impl From<&App> for AppRef {
    fn from(app: &App) -> Self {
        Self {
            id: app.id,
            name: app.name.clone(),
            category_id: app.category_id,
            category: app.category.clone(),
        }
    }
}

/// Rating summary and 5-bucket histogram for one app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub id: i64,
    pub name: String,
    pub category_id: i64,
    pub category: String,
    /// Average rating.
    pub rating: f64,
    /// Total number of written reviews.
    pub reviews: i64,
    /// Total number of ratings.
    pub ratings: i64,
    pub onestar: i64,
    pub twostar: i64,
    pub threestar: i64,
    pub fourstar: i64,
    pub fivestar: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RatingWire {
    rating_average: f64,
    total_number_of_reviews: i64,
    rating_count: i64,
    rating_count_list: Vec<i64>,
}

impl Rating {
    /// Parse a customer-reviews payload for `app`.
    pub fn from_payload(app: &AppRef, value: &serde_json::Value) -> Result<Self, AppError> {
        let wire = RatingWire::deserialize(value)?;
        let [onestar, twostar, threestar, fourstar, fivestar] =
            <[i64; 5]>::try_from(wire.rating_count_list).map_err(|list| {
                AppError::ParseError(format!(
                    "ratingCountList for app {} has {} buckets, expected 5",
                    app.id,
                    list.len()
                ))
            })?;

        Ok(Self {
            id: app.id,
            name: app.name.clone(),
            category_id: app.category_id,
            category: app.category.clone(),
            rating: wire.rating_average,
            reviews: wire.total_number_of_reviews,
            ratings: wire.rating_count,
            onestar,
            twostar,
            threestar,
            fourstar,
            fivestar,
        })
    }
}

/// A single user review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub app_id: i64,
    pub app_name: String,
    pub category_id: i64,
    pub category: String,
    pub author: String,
    pub rating: i64,
    pub title: String,
    pub content: String,
    /// Word count of `content`.
    pub review_length: i64,
    pub vote_sum: i64,
    pub vote_count: i64,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewWire {
    user_review_id: serde_json::Value,
    #[serde(default)]
    name: String,
    rating: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    vote_sum: i64,
    #[serde(default)]
    vote_count: i64,
    date: Option<DateTime<Utc>>,
}

impl Review {
    /// Parse one element of a `userReviewList` for `app`.
    pub fn from_payload(app: &AppRef, value: &serde_json::Value) -> Result<Self, AppError> {
        let wire = ReviewWire::deserialize(value)?;
        // The id arrives as a string or a number depending on the storefront.
        let id = match wire.user_review_id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(AppError::ParseError(format!(
                    "userReviewId has unexpected type: {other}"
                )));
            }
        };
        let content = wire.body.trim().to_string();

        Ok(Self {
            id,
            app_id: app.id,
            app_name: app.name.clone(),
            category_id: app.category_id,
            category: app.category.clone(),
            author: wire.name,
            rating: wire.rating,
            title: wire.title,
            review_length: content.split_whitespace().count() as i64,
            content,
            vote_sum: wire.vote_sum,
            vote_count: wire.vote_count,
            date: wire.date,
        })
    }
}

/// How far the review harvest of one app has progressed.
///
/// `last_index` is the start of the first review window not yet stored.
/// Once `exhausted` is set the app has no further reviews to fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewCursor {
    pub app_id: i64,
    pub category_id: i64,
    pub last_index: u64,
    pub exhausted: bool,
    pub updated: DateTime<Utc>,
}

impl ReviewCursor {
    /// A cursor at the first review of `app`.
    pub fn new(app: &AppRef) -> Self {
        Self {
            app_id: app.id,
            category_id: app.category_id,
            last_index: 0,
            exhausted: false,
            updated: Utc::now(),
        }
    }

    /// Record that every review before `index` is stored.
    pub fn advance(&mut self, index: u64) {
        self.last_index = self.last_index.max(index);
        self.updated = Utc::now();
    }

    pub fn exhaust(&mut self) {
        self.exhausted = true;
        self.updated = Utc::now();
    }
}
