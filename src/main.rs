// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

pub mod parser;
pub mod utils;

use anyhow::Error;
use clap::{App, Arg, ArgMatches, SubCommand};
use config::{Config, DEFAULT_CONFIG_PATH};
use controller::{Controller, Entity, Requester, ToTable, UserId};
use engine::accounts::Confirmation;
use engine::{BrowseQuery, Engine};
use memory::MemoryController;
use montage_pg::PgController;
use parser::Statement;
use rustyline::Editor;
use scheduler::{Schedule, Scheduler};
use simplelog::{LevelFilter, TermLogger, TerminalMode};
use std::sync::Arc;

macro_rules! prompt {
    ($ed:ident, $db:expr) => {{
        use rustyline::error::ReadlineError;

        let msg = format!("({}) {}", $db, PROMPT);

        match $ed.readline(&msg) {
            Ok(line) => {
                $ed.add_history_entry(line.as_str());
                Ok(line)
            }

            Err(ReadlineError::Interrupted) => {
                continue;
            }

            Err(ReadlineError::Eof) => {
                println!("Disconnecting from {}", $db);
                break;
            }

            Err(e) => Err(e),
        }
    }};
}

const VERSION: &str = env!("CARGO_PKG_VERSION");
const PROMPT: &str = ">> ";

/// Identity the console acts with when no member is named, ids start at 1
const CONSOLE_OPERATOR: UserId = 0;

fn operator() -> Requester {
    Requester::admin(CONSOLE_OPERATOR)
}

fn print_help() {
    println!("Console help:");
    println!("h | help                              Shows this help");
    println!("q | quit                              Quit");
    println!("popular(n) | hero(n) | recent(n)      Home page lists");
    println!("top(n[, min_reviews])                 Top rated movies");
    println!("browse(mode, page[, genre(g), year(y), min(r)])");
    println!("                                      Catalog, mode is popular, rating, recent or title");
    println!("movie(id(n) | title('t') | tmdb(n))   Movie details and rating summary");
    println!("reviews(movie[, page])                Reviews of a movie");
    println!("profile(user[, page])                 Reviews written by a user");
    println!("latest(n)                             Newest reviews");
    println!("search('text')                        Search movies, users and reviews");
    println!("review(user, movie, rating[, 'text']) Submit or update a review");
    println!("unreview(review[, user])              Delete a review");
    println!("register('email', 'password', 'name') Create an account");
    println!("confirm('token')                      Confirm an email address");
    println!("add_movie | delete_movie(movie)       Edit the catalog");
    println!("recompute(movie) | sweep | cleanup    Maintenance");
    println!("dashboard                             Site totals");
}

fn execute<C: Controller + ?Sized>(
    engine: &Engine<C>,
    config: &Config,
    rl: &mut Editor<()>,
    statement: Statement,
) -> Result<(), Error> {
    let controller = engine.controller();

    match statement {
        Statement::Popular(limit) => print_ranking(&engine.top_by_review_count(limit)?),

        Statement::TopRated(limit, min_reviews) => {
            let min_reviews = min_reviews.unwrap_or(config.catalog.ranking_min_reviews);
            print_ranking(&engine.top_by_rating(limit, min_reviews)?)
        }

        Statement::Recent(limit) => print_ranking(&engine.recent(limit)?),

        Statement::Hero(limit) => print_ranking(&engine.hero_carousel(limit)?),

        Statement::Browse(sort, page, filter) => {
            let query = BrowseQuery::new(sort, page, config.catalog.movies_per_page).with_filter(filter);
            let page = engine.browse(&query)?;

            print_ranking(&page.items);
            println!(
                "Sorted by {}, page {} of {} ({} movies)",
                sort,
                page.page,
                page.pages(),
                page.total
            );
        }

        Statement::Movie(by) => {
            let movies = controller.movies_by(&by)?;
            if movies.is_empty() {
                println!("No movie matches {}", by);
            }

            for movie in movies {
                let summary = engine.movie_rating_summary(movie.get_id())?;
                println!("{}", movie.to_table());
                println!("{} reviews", summary.review_count);
                for (stars, count) in summary.distribution.iter().rev() {
                    println!("  {} stars: {}", stars, count);
                }
            }
        }

        Statement::Reviews(movie_id, page) => {
            let page = engine.movie_reviews(movie_id, page)?;
            for review in &page.items {
                println!("{}", review.to_table());
            }

            println!("Page {} of {} ({} reviews)", page.page, page.pages(), page.total);
        }

        Statement::Profile(user_id, page) => {
            let profile = engine.user_profile(user_id, page)?;
            println!("{}", profile.user.to_table());
            println!("Mean rating given: {:.2}", profile.mean_rating);

            for review in &profile.reviews.items {
                println!("{}", review.to_table());
            }
        }

        Statement::Latest(limit) => {
            for review in engine.latest_reviews(limit)? {
                println!("{}", review.to_table());
            }
        }

        Statement::Search(text) => {
            let results = engine.search(&text)?;
            if results.is_empty() {
                println!("Nothing found for {:?}", text);
            }

            for movie in &results.movies {
                println!("movie({}) {} [{:.2}]", movie.movie_id, movie.title, movie.avg_rating);
            }

            for user in &results.users {
                println!("user({}) {}", user.user_id, user.display_name);
            }

            for review in &results.reviews {
                println!("{}", review.to_table());
            }
        }

        Statement::Review {
            user_id,
            movie_id,
            rating,
            comment,
        } => {
            let review = engine.upsert_review(user_id, movie_id, rating, comment.as_deref())?;
            let movie = controller.movie(movie_id)?;

            println!("{}", review.to_table());
            println!("Average rating of {} is now {:.2}", movie.title, movie.avg_rating);
        }

        Statement::Unreview(review_id, user_id) => {
            let requester = match user_id {
                Some(user_id) => Requester::from(&controller.user(user_id)?),
                None => operator(),
            };

            engine.delete_review(review_id, requester)?;
            println!("Review({}) deleted", review_id);
        }

        Statement::Register {
            email,
            password,
            display_name,
        } => {
            let (user, token) = engine.register(&email, &password, &display_name)?;
            println!("{}", user.to_table());
            println!("Confirmation token: {}", token.value);
        }

        Statement::Confirm(token) => match engine.confirm_email(&token)? {
            Confirmation::Confirmed(user) => println!("{} is now confirmed", user.email),
            Confirmation::AlreadyConfirmed(user) => println!("{} was already confirmed", user.email),
        },

        Statement::AddMovie => match utils::read_new_movie(rl)? {
            Some(movie) => {
                let movie = engine.admin_add_movie(operator(), &movie)?;
                println!("{}", movie.to_table());
            }

            None => println!("Cancelled"),
        },

        Statement::DeleteMovie(movie_id) => {
            let movie = engine.admin_delete_movie(operator(), movie_id)?;
            println!("Deleted {} and its reviews", movie.title);
        }

        Statement::Recompute(movie_id) => {
            let avg = engine.recompute(movie_id)?;
            println!("Average rating of movie({}) is now {:.2}", movie_id, avg);
        }

        Statement::Sweep => {
            let report = engine.recompute_all(config.maintenance.chunk_size)?;
            println!("Ratings: {}", report);
        }

        Statement::Cleanup => {
            let report = engine.cleanup_expired_tokens()?;
            println!("Tokens: {}", report);
        }

        Statement::Dashboard => {
            let dashboard = engine.dashboard(operator())?;
            let counts = dashboard.counts;
            println!(
                "{} users, {} movies, {} reviews",
                counts.users, counts.movies, counts.reviews
            );

            print_ranking(&dashboard.popular);
            for review in &dashboard.latest_reviews {
                println!("{}", review.to_table());
            }
        }
    }

    Ok(())
}

fn print_ranking(stats: &[controller::MovieStats]) {
    if stats.is_empty() {
        println!("No movies found");
    } else {
        println!("{}", stats.to_table());
    }
}

fn console<C: Controller + ?Sized>(controller: &C, config: &Config, name: &str) -> Result<(), Error> {
    let engine = Engine::with_config(controller, config);
    let mut rl = Editor::<()>::new();

    println!("Welcome to montage {}, type 'help' for help", VERSION);

    loop {
        let line: String = prompt!(rl, name)?;

        match line.trim() {
            "?" | "h" | "help" => print_help(),

            "q" | "quit" => {
                println!("Bye!");
                break;
            }

            "v" | "version" => {
                println!("version: {}", VERSION);
            }

            empty if empty.is_empty() => {}

            line => match parser::parse_line(line) {
                Some(statement) => {
                    if let Err(e) = execute(&engine, config, &mut rl, statement) {
                        println!("{}", e);
                    }
                }

                None => println!("Invalid syntax!"),
            },
        }
    }

    Ok(())
}

fn connect(config: &Config) -> Result<PgController, Error> {
    let controller = PgController::from_config(config)?;
    controller.run_migrations()?;
    Ok(controller)
}

/// Run the periodic sweeps until CTRL-C. Every run opens its own connection.
async fn maintain(config: Config) -> Result<(), Error> {
    let mut scheduler = Scheduler::new();

    let ratings_config = config.clone();
    scheduler.add_job(
        "recompute-ratings",
        Schedule::Daily {
            hour: config.maintenance.ranking_update_hour,
            minute: config.maintenance.ranking_update_minute,
        },
        Arc::new(move || -> Result<(), Error> {
            let controller = PgController::from_config(&ratings_config)?;
            Engine::with_config(&controller, &ratings_config)
                .recompute_all(ratings_config.maintenance.chunk_size)?;
            Ok(())
        }),
    )?;

    let tokens_config = config.clone();
    scheduler.add_job(
        "cleanup-tokens",
        Schedule::Hourly {
            minute: config.maintenance.token_cleanup_minute,
        },
        Arc::new(move || -> Result<(), Error> {
            let controller = PgController::from_config(&tokens_config)?;
            Engine::with_config(&controller, &tokens_config).cleanup_expired_tokens()?;
            Ok(())
        }),
    )?;

    scheduler.start()?;
    log::info!("Running {}, press CTRL-C to stop", scheduler.job_ids().join(", "));

    tokio::signal::ctrl_c().await?;
    scheduler.stop().await;

    Ok(())
}

fn log_level(matches: &ArgMatches, quiet: bool) -> LevelFilter {
    let base = if quiet { 0 } else { 1 };
    match base + matches.occurrences_of("verbose") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() -> Result<(), Error> {
    let matches = App::new("montage")
        .version(VERSION)
        .about("Movie review community, operator tools")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .default_value(DEFAULT_CONFIG_PATH)
                .help("Configuration file, defaults apply if it doesn't exist"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("More logging, repeat for even more"),
        )
        .subcommand(
            SubCommand::with_name("console")
                .about("Interactive console (default)")
                .arg(
                    Arg::with_name("memory")
                        .long("memory")
                        .help("Use an empty in-memory store instead of the database"),
                ),
        )
        .subcommand(SubCommand::with_name("recompute").about("Recompute every average rating now"))
        .subcommand(SubCommand::with_name("cleanup-tokens").about("Clear expired tokens now"))
        .subcommand(SubCommand::with_name("maintain").about("Run the periodic maintenance jobs"))
        .get_matches();

    let (command, sub) = matches.subcommand();
    let interactive = command == "console" || command.is_empty();
    TermLogger::init(
        log_level(&matches, interactive),
        simplelog::Config::default(),
        TerminalMode::Mixed,
    )?;

    let config_path = matches.value_of("config").unwrap_or(DEFAULT_CONFIG_PATH);
    let config = Config::load_or_default(config_path)?;

    match command {
        "recompute" => {
            let controller = connect(&config)?;
            let report = Engine::with_config(&controller, &config)
                .recompute_all(config.maintenance.chunk_size)?;
            println!("Ratings: {}", report);
        }

        "cleanup-tokens" => {
            let controller = connect(&config)?;
            let report = Engine::with_config(&controller, &config).cleanup_expired_tokens()?;
            println!("Tokens: {}", report);
        }

        "maintain" => {
            connect(&config)?;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(maintain(config))?;
        }

        _ => {
            if sub.map_or(false, |sub| sub.is_present("memory")) {
                console(&MemoryController::new(), &config, "memory")?;
            } else {
                console(&connect(&config)?, &config, "montage")?;
            }
        }
    }

    Ok(())
}
