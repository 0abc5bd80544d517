use async_trait::async_trait;
use catalogd_model::{EntityState, Episode, LibraryId, Movie, MovieId, Season, Series, SeriesId};
use chrono::Duration;
use sqlx::PgPool;

use crate::error::CoreError;

/// Persistence for the four entity kinds. Kept as one trait (rather
/// than one per kind) since the scan/enrich pipeline treats them
/// uniformly outside of movie-specific discovery; movies carry the
/// richest API since discovery/scan today is movie-oriented.
#[async_trait]
pub trait EntityRepository: Send + Sync {
    async fn upsert_movie_by_path(&self, movie: &Movie) -> Result<Movie, CoreError>;
    async fn get_movie(&self, id: MovieId) -> Result<Option<Movie>, CoreError>;
    async fn update_movie(&self, movie: &Movie) -> Result<(), CoreError>;
    async fn movies_needing_enrichment(
        &self,
        stale_after: Duration,
        limit: i64,
    ) -> Result<Vec<Movie>, CoreError>;
    async fn monitored_movies(&self, limit: i64) -> Result<Vec<Movie>, CoreError>;

    async fn upsert_series_by_path(&self, series: &Series) -> Result<Series, CoreError>;
    async fn get_series(&self, id: SeriesId) -> Result<Option<Series>, CoreError>;

    async fn upsert_season(&self, season: &Season) -> Result<Season, CoreError>;
    async fn upsert_episode(&self, episode: &Episode) -> Result<Episode, CoreError>;
}

#[derive(Clone)]
pub struct PostgresEntityRepository {
    pool: PgPool,
}

impl PostgresEntityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const MOVIE_COLUMNS: &str = "id, library_id, path, title, year, imdb_id, tmdb_id, tvdb_id, \
    state, last_scraped_at, enrichment_priority, monitored, created_at, updated_at";

#[async_trait]
impl EntityRepository for PostgresEntityRepository {
    async fn upsert_movie_by_path(&self, movie: &Movie) -> Result<Movie, CoreError> {
        let row = sqlx::query_as::<_, Movie>(&format!(
            r#"
            INSERT INTO movies ({MOVIE_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (library_id, path) DO UPDATE SET
                title = EXCLUDED.title,
                year = EXCLUDED.year,
                updated_at = now()
            RETURNING {MOVIE_COLUMNS}
            "#
        ))
        .bind(movie.id)
        .bind(movie.library_id)
        .bind(movie.path.to_string_lossy().to_string())
        .bind(&movie.title)
        .bind(movie.year)
        .bind(&movie.external_ids.imdb_id)
        .bind(movie.external_ids.tmdb_id)
        .bind(movie.external_ids.tvdb_id)
        .bind(movie.state)
        .bind(movie.last_scraped_at)
        .bind(movie.enrichment_priority)
        .bind(movie.monitored)
        .bind(movie.created_at)
        .bind(movie.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_movie(&self, id: MovieId) -> Result<Option<Movie>, CoreError> {
        let row = sqlx::query_as::<_, Movie>(&format!(
            "SELECT {MOVIE_COLUMNS} FROM movies WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_movie(&self, movie: &Movie) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE movies SET title = $2, year = $3, imdb_id = $4, tmdb_id = $5, tvdb_id = $6, \
             state = $7, last_scraped_at = $8, enrichment_priority = $9, monitored = $10, \
             updated_at = now() WHERE id = $1",
        )
        .bind(movie.id)
        .bind(&movie.title)
        .bind(movie.year)
        .bind(&movie.external_ids.imdb_id)
        .bind(movie.external_ids.tmdb_id)
        .bind(movie.external_ids.tvdb_id)
        .bind(movie.state)
        .bind(movie.last_scraped_at)
        .bind(movie.enrichment_priority)
        .bind(movie.monitored)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn movies_needing_enrichment(
        &self,
        stale_after: Duration,
        limit: i64,
    ) -> Result<Vec<Movie>, CoreError> {
        let cutoff = chrono::Utc::now() - stale_after;
        let rows = sqlx::query_as::<_, Movie>(&format!(
            r#"
            SELECT {MOVIE_COLUMNS} FROM movies
            WHERE state = $1
               OR enrichment_priority > 0
               OR last_scraped_at IS NULL
               OR last_scraped_at < $2
            ORDER BY enrichment_priority DESC, id ASC
            LIMIT $3
            "#
        ))
        .bind(EntityState::Discovered)
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn monitored_movies(&self, limit: i64) -> Result<Vec<Movie>, CoreError> {
        let rows = sqlx::query_as::<_, Movie>(&format!(
            "SELECT {MOVIE_COLUMNS} FROM movies WHERE monitored = true ORDER BY id ASC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn upsert_series_by_path(&self, series: &Series) -> Result<Series, CoreError> {
        let row = sqlx::query_as::<_, Series>(
            r#"
            INSERT INTO series (id, library_id, path, title, year, imdb_id, tmdb_id, tvdb_id,
                state, last_scraped_at, enrichment_priority, monitored, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (library_id, path) DO UPDATE SET title = EXCLUDED.title, updated_at = now()
            RETURNING id, library_id, path, title, year, imdb_id, tmdb_id, tvdb_id, state,
                last_scraped_at, enrichment_priority, monitored, created_at, updated_at
            "#,
        )
        .bind(series.id)
        .bind(series.library_id)
        .bind(series.path.to_string_lossy().to_string())
        .bind(&series.title)
        .bind(series.year)
        .bind(&series.external_ids.imdb_id)
        .bind(series.external_ids.tmdb_id)
        .bind(series.external_ids.tvdb_id)
        .bind(series.state)
        .bind(series.last_scraped_at)
        .bind(series.enrichment_priority)
        .bind(series.monitored)
        .bind(series.created_at)
        .bind(series.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_series(&self, id: SeriesId) -> Result<Option<Series>, CoreError> {
        let row = sqlx::query_as::<_, Series>(
            "SELECT id, library_id, path, title, year, imdb_id, tmdb_id, tvdb_id, state, \
             last_scraped_at, enrichment_priority, monitored, created_at, updated_at \
             FROM series WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn upsert_season(&self, season: &Season) -> Result<Season, CoreError> {
        let row = sqlx::query_as::<_, Season>(
            r#"
            INSERT INTO seasons (id, series_id, season_number, state, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (series_id, season_number) DO UPDATE SET updated_at = now()
            RETURNING id, series_id, season_number, state, created_at, updated_at
            "#,
        )
        .bind(season.id)
        .bind(season.series_id)
        .bind(season.season_number)
        .bind(season.state)
        .bind(season.created_at)
        .bind(season.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn upsert_episode(&self, episode: &Episode) -> Result<Episode, CoreError> {
        let row = sqlx::query_as::<_, Episode>(
            r#"
            INSERT INTO episodes (id, season_id, path, episode_number, title, state,
                last_scraped_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (season_id, path) DO UPDATE SET title = EXCLUDED.title, updated_at = now()
            RETURNING id, season_id, path, episode_number, title, state, last_scraped_at,
                created_at, updated_at
            "#,
        )
        .bind(episode.id)
        .bind(episode.season_id)
        .bind(episode.path.to_string_lossy().to_string())
        .bind(episode.episode_number)
        .bind(&episode.title)
        .bind(episode.state)
        .bind(episode.last_scraped_at)
        .bind(episode.created_at)
        .bind(episode.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}
