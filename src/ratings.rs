//! Restaurant and rating models, list queries, and the aggregate rating
//! update.

use crate::datastore::MemoryDatastore;
use crate::error::{Result, SyncError};
use crate::query::{Direction, Query};
use crate::types::{DocumentId, Timestamp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Top-level collection of restaurants.
pub const RESTAURANTS: &str = "restaurants";

/// Subcollection of ratings under each restaurant.
pub const RATINGS: &str = "ratings";

/// Page size used by the restaurant and rating lists.
pub const DEFAULT_LIMIT: usize = 50;

const NAME_FIRST_WORDS: &[&str] = &[
    "Foo", "Bar", "Baz", "Qux", "Fire", "Sam's", "World Famous", "Google", "The Best",
];

const NAME_SECOND_WORDS: &[&str] = &[
    "Restaurant", "Cafe", "Spot", "Eatin' Place", "Eatery", "Drive Thru", "Diner",
];

const CITIES: &[&str] = &[
    "Albuquerque", "Arlington", "Atlanta", "Austin", "Baltimore", "Boston", "Charlotte",
    "Chicago", "Denver", "Detroit", "Oakland", "Portland", "San Francisco", "Seattle",
];

const CATEGORIES: &[&str] = &[
    "Brunch", "Burgers", "Coffee", "Deli", "Dim Sum", "Indian", "Italian", "Mediterranean",
    "Mexican", "Pizza", "Ramen", "Sushi",
];

const PHOTO_COUNT: u8 = 22;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Restaurant {
    pub name: String,
    pub city: String,
    pub category: String,
    pub photo: String,
    /// 1 to 3.
    pub price: i64,
    pub num_ratings: u64,
    pub avg_rating: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub user_id: String,
    pub user_name: String,
    /// 1.0 to 5.0.
    pub rating: f64,
    pub text: String,
    pub timestamp: Timestamp,
}

impl Rating {
    pub fn new(
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        rating: f64,
        text: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            rating,
            text: text.into(),
            timestamp: Timestamp::now(),
        }
    }
}

/// Restaurant list filters. `None` means "any".
#[derive(Clone, Debug, PartialEq)]
pub struct Filters {
    pub category: Option<String>,
    pub city: Option<String>,
    pub price: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_direction: Direction,
}

impl Default for Filters {
    /// Everything, best rated first.
    fn default() -> Self {
        Self {
            category: None,
            city: None,
            price: None,
            sort_by: Some("avgRating".to_string()),
            sort_direction: Direction::Descending,
        }
    }
}

impl Filters {
    /// Build the restaurant list query for these filters.
    pub fn to_query(&self) -> Query {
        let mut query = Query::collection(RESTAURANTS);
        if let Some(category) = &self.category {
            query = query.where_eq("category", category.as_str());
        }
        if let Some(city) = &self.city {
            query = query.where_eq("city", city.as_str());
        }
        if let Some(price) = self.price {
            query = query.where_eq("price", price);
        }
        if let Some(sort_by) = &self.sort_by {
            query = query.order_by(sort_by.as_str(), self.sort_direction);
        }
        query.limit(DEFAULT_LIMIT)
    }
}

pub fn restaurant_path(restaurant_id: &str) -> String {
    format!("{}/{}", RESTAURANTS, restaurant_id)
}

pub fn ratings_collection(restaurant_id: &str) -> String {
    format!("{}/{}/{}", RESTAURANTS, restaurant_id, RATINGS)
}

/// Most recent ratings of one restaurant first.
pub fn ratings_query(restaurant_id: &str, limit: usize) -> Query {
    Query::collection(ratings_collection(restaurant_id))
        .order_by("timestamp", Direction::Descending)
        .limit(limit)
}

/// Running average after adding one rating to `count` existing ones.
pub fn updated_average(avg: f64, count: u64, rating: f64) -> f64 {
    let total = avg * count as f64 + rating;
    total / (count + 1) as f64
}

/// Build a sample restaurant whose fields are picked by hashing `seed`.
pub fn sample_restaurant(seed: &str) -> Restaurant {
    let digest = Sha256::digest(seed.as_bytes());
    let pick = |list: &[&str], byte: u8| list[byte as usize % list.len()].to_string();

    let num_ratings = u64::from(digest[5] % 10);
    let avg_rating = if num_ratings == 0 {
        0.0
    } else {
        1.0 + f64::from(digest[6] % 41) / 10.0
    };

    Restaurant {
        name: format!(
            "{} {}",
            pick(NAME_FIRST_WORDS, digest[0]),
            pick(NAME_SECOND_WORDS, digest[1])
        ),
        city: pick(CITIES, digest[2]),
        category: pick(CATEGORIES, digest[3]),
        photo: format!(
            "https://storage.googleapis.com/firestorequickstarts.appspot.com/food_{}.png",
            digest[7] % PHOTO_COUNT + 1
        ),
        price: i64::from(digest[4] % 3) + 1,
        num_ratings,
        avg_rating,
    }
}

/// Add `count` sample restaurants, one write each. Returns their ids.
pub fn add_sample_restaurants(store: &MemoryDatastore, count: usize) -> Result<Vec<DocumentId>> {
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        let id = store.auto_id();
        store.set_object(&restaurant_path(id.as_str()), &sample_restaurant(id.as_str()))?;
        ids.push(id);
    }
    debug!(count, "added sample restaurants");
    Ok(ids)
}

/// Store a new rating and update the restaurant's aggregate in one
/// transaction. Returns the id of the new rating document.
pub fn add_rating(store: &MemoryDatastore, restaurant_id: &str, rating: &Rating) -> Result<DocumentId> {
    if !(1.0..=5.0).contains(&rating.rating) {
        return Err(SyncError::InvalidArgument(format!(
            "rating {} outside 1..=5",
            rating.rating
        )));
    }

    let restaurant_path = restaurant_path(restaurant_id);
    let rating_id = store.auto_id();
    let rating_path = format!("{}/{}", ratings_collection(restaurant_id), rating_id);

    store.run_transaction(|tx| {
        let document = tx
            .get(&restaurant_path)?
            .ok_or_else(|| SyncError::DocumentNotFound(restaurant_path.clone()))?;
        let mut restaurant: Restaurant = document.to_object()?;

        restaurant.avg_rating =
            updated_average(restaurant.avg_rating, restaurant.num_ratings, rating.rating);
        restaurant.num_ratings += 1;

        tx.set_object(&restaurant_path, &restaurant)?;
        tx.set_object(&rating_path, rating)?;
        Ok(())
    })?;

    debug!(restaurant = restaurant_id, rating = %rating_id, "added rating");
    Ok(rating_id)
}
