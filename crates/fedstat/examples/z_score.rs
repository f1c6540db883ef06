// Z-score normalization parameters of features spread over several
// participants: the mean and variance are computed under encryption, dividing
// by an encrypted inverse of the total counts.

mod util;

use std::{env, error::Error, process::exit};

use console::style;
use fedstat::{reference, Federation};
use fedstat_ckks::ckks::CkksParameters;
use util::{demo_config, parse_value, participants, pooled, random_data, timeit::timeit};

fn print_notice_and_exit(error: Option<String>) {
    println!(
        "{} Federated z-score normalization",
        style("  overview:").magenta().bold()
    );
    println!(
        "{} z_score [-h] [--help] [--num_parties=<value>] [--num_features=<value>] [--rows=<value>]",
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

    println!("# Federated z-score normalization");
    println!("\tnum_parties = {num_parties}");
    println!("\tnum_features = {num_features}");
    println!("\trows = {rows} per participant and feature");

    let par = CkksParameters::default_arc(8)?;
    // The total count of a feature lies in [1, 2^max_log_count].
    let max_log_count = ((num_parties * rows) as f64).log2().ceil() + 1.0;
    let data = random_data(num_parties, num_features, rows, (-100.0, 100.0));
    let federation = timeit!(
        "Collective key generation",
        Federation::new(demo_config(max_log_count), participants(&par, &data)?)?
    );
    let z = timeit!("Federated mean and variance", federation.z_score()?);

    println!("\n## Results");
    for j in 0..num_features {
        let values = pooled(&data, j);
        let mean = reference::mean(&values).unwrap_or_default();
        let std_dev = reference::population_variance(&values)
            .unwrap_or_default()
            .sqrt();
        println!(
            "\tfeature {j}: mean {:>10.4} (expected {mean:>10.4}), std {:>10.4} (expected {std_dev:>10.4})",
            z.mean[j], z.std_dev[j]
        );
    }
    Ok(())
}
