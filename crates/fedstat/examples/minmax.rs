// Global minimum and maximum of features spread over several participants,
// computed by comparing encrypted local extrema.

mod util;

use std::{env, error::Error, process::exit};

use console::style;
use fedstat::{reference, stats::NormalizationFactors, Federation};
use fedstat_ckks::ckks::CkksParameters;
use util::{demo_config, parse_value, participants, pooled, random_data, timeit::timeit};

fn print_notice_and_exit(error: Option<String>) {
    println!(
        "{} Federated minimum and maximum",
        style("  overview:").magenta().bold()
    );
    println!(
        "{} minmax [-h] [--help] [--num_parties=<value>] [--num_features=<value>] [--rows=<value>]",
        style("     usage:").magenta().bold()
    );
    println!(
        "{} {}, {} and {} must be at least 1, and {} at most 8",
        style("constraints:").magenta().bold(),
        style("num_parties").blue(),
        style("num_features").blue(),
        style("rows").blue(),
        style("num_features").blue(),
    );
    if let Some(error) = error {
        println!("{} {}", style("     error:").red().bold(), error);
    }
    exit(0);
}

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.contains(&"-h".to_string()) || args.contains(&"--help".to_string()) {
        print_notice_and_exit(None)
    }

    let mut num_parties = 4;
    let mut num_features = 3;
    let mut rows = 50;
    for arg in &args {
        if arg.starts_with("--num_parties") {
            match parse_value(arg, "--num_parties") {
                Some(v) => num_parties = v,
                None => print_notice_and_exit(Some("Invalid `--num_parties` argument".to_string())),
            }
        } else if arg.starts_with("--num_features") {
            match parse_value(arg, "--num_features") {
                Some(v) => num_features = v,
                None => print_notice_and_exit(Some("Invalid `--num_features` argument".to_string())),
            }
        } else if arg.starts_with("--rows") {
            match parse_value(arg, "--rows") {
                Some(v) => rows = v,
                None => print_notice_and_exit(Some("Invalid `--rows` argument".to_string())),
            }
        } else {
            print_notice_and_exit(Some(format!("Unrecognized argument: {arg}")))
        }
    }
    if num_parties == 0 || num_features == 0 || rows == 0 {
        print_notice_and_exit(Some("All parameters must be nonzero".to_string()))
    }
    if num_features > 8 {
        print_notice_and_exit(Some("At most 8 features fit in the slots".to_string()))
    }

    println!("# Federated minimum and maximum");
    println!("\tnum_parties = {num_parties}");
    println!("\tnum_features = {num_features}");
    println!("\trows = {rows} per participant and feature");

    let par = CkksParameters::default_arc(8)?;
    let data = random_data(num_parties, num_features, rows, (-100.0, 100.0));
    let federation = timeit!(
        "Collective key generation",
        Federation::new(demo_config(8.0), participants(&par, &data)?)?
    );
    let factors = NormalizationFactors::uniform(128.0, num_features)?;
    let extrema = timeit!("Federated minimum and maximum", federation.min_max(&factors)?);

    println!("\n## Results");
    for j in 0..num_features {
        let (min, max) = reference::min_max(&pooled(&data, j)).unwrap_or_default();
        println!(
            "\tfeature {j}: min {:>10.4} (expected {min:>10.4}), max {:>10.4} (expected {max:>10.4})",
            extrema.min[j], extrema.max[j]
        );
    }
    Ok(())
}
