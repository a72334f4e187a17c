table! {
    movies (movie_id) {
        movie_id -> Int4,
        title -> Varchar,
        release_year -> Nullable<Int4>,
        avg_rating -> Float8,
        poster_url -> Nullable<Varchar>,
        genres -> Array<Text>,
        runtime -> Nullable<Int4>,
        tagline -> Nullable<Varchar>,
        overview -> Nullable<Text>,
        vote_average -> Nullable<Float8>,
        tmdb_id -> Nullable<Int4>,
        created_at -> Timestamp,
    }
}

table! {
    reviews (review_id) {
        review_id -> Int4,
        user_id -> Int4,
        movie_id -> Int4,
        rating -> Int2,
        comment_text -> Nullable<Text>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

table! {
    users (user_id) {
        user_id -> Int4,
        email -> Varchar,
        password_hash -> Varchar,
        display_name -> Varchar,
        created_at -> Timestamp,
        is_active -> Bool,
        email_confirmed -> Bool,
        role -> Varchar,
        token_kind -> Nullable<Varchar>,
        token_value -> Nullable<Varchar>,
        token_issued_at -> Nullable<Timestamp>,
    }
}

joinable!(reviews -> movies (movie_id));
joinable!(reviews -> users (user_id));

allow_tables_to_appear_in_same_query!(
    movies,
    reviews,
    users,
);
