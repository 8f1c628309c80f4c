//! Aggregate statistics kept alongside movies and profiles.
//!
//! Single rows are recomputed after each rating change; `refresh_all`
//! rebuilds everything in parallel after a load.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::store::Tables;
use crate::types::{MovieId, PrincipalId, UserProfile};

/// Mean of the given scores, 0.0 for an empty set
pub(crate) fn average(scores: &[f32]) -> f32 {
    if scores.is_empty() {
        return 0.0;
    }
    let total: f32 = scores.iter().sum();
    total / scores.len() as f32
}

pub(crate) fn recompute_movie(tables: &mut Tables, movie_id: MovieId) {
    let scores: Vec<f32> = tables
        .ratings
        .values()
        .filter(|r| r.movie_id == movie_id)
        .map(|r| r.score)
        .collect();
    if let Some(movie) = tables.movies.get_mut(&movie_id) {
        movie.rating_count = scores.len() as u32;
        movie.avg_rating = average(&scores);
    }
}

pub(crate) fn recompute_profile(tables: &mut Tables, principal_id: PrincipalId) {
    let scores = scores_by(tables, principal_id);
    if let Some(profile) = tables.profiles.get_mut(&principal_id) {
        profile.ratings_count = scores.len() as u32;
        profile.avg_rating_given = average(&scores);
    }
}

/// Fill a profile that is not yet in the table
pub(crate) fn apply_profile_stats(tables: &Tables, profile: &mut UserProfile) {
    let scores = scores_by(tables, profile.principal_id);
    profile.ratings_count = scores.len() as u32;
    profile.avg_rating_given = average(&scores);
}

fn scores_by(tables: &Tables, principal_id: PrincipalId) -> Vec<f32> {
    tables
        .ratings
        .range((principal_id, MovieId::MIN)..=(principal_id, MovieId::MAX))
        .map(|(_, r)| r.score)
        .collect()
}

/// Recompute every movie and profile aggregate
pub(crate) fn refresh_all(tables: &mut Tables) {
    let mut by_movie: HashMap<MovieId, Vec<f32>> = HashMap::new();
    let mut by_principal: HashMap<PrincipalId, Vec<f32>> = HashMap::new();
    for rating in tables.ratings.values() {
        by_movie.entry(rating.movie_id).or_default().push(rating.score);
        by_principal
            .entry(rating.principal_id)
            .or_default()
            .push(rating.score);
    }

    let movie_stats: HashMap<MovieId, (u32, f32)> = by_movie
        .par_iter()
        .map(|(&movie_id, scores)| (movie_id, (scores.len() as u32, average(scores))))
        .collect();
    let profile_stats: HashMap<PrincipalId, (u32, f32)> = by_principal
        .par_iter()
        .map(|(&principal_id, scores)| (principal_id, (scores.len() as u32, average(scores))))
        .collect();

    for (movie_id, movie) in tables.movies.iter_mut() {
        let (count, avg) = movie_stats.get(movie_id).copied().unwrap_or((0, 0.0));
        movie.rating_count = count;
        movie.avg_rating = avg;
    }
    for (principal_id, profile) in tables.profiles.iter_mut() {
        let (count, avg) = profile_stats.get(principal_id).copied().unwrap_or((0, 0.0));
        profile.ratings_count = count;
        profile.avg_rating_given = avg;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average() {
        assert_eq!(average(&[]), 0.0);
        assert!((average(&[4.0, 5.0, 3.0]) - 4.0).abs() < 1e-6);
    }
}
