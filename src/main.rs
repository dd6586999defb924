use tbsim::runner::run_with_args;

fn main() {
    match run_with_args() {
        Ok(engine) => {
            let metrics = engine.metrics();
            println!(
                "completed after {} days: {:.0} infections, {:.0} deaths, {:.0} prevented",
                engine.day(),
                metrics.cumulative_infections,
                metrics.cumulative_deaths,
                metrics.prevented_infections
            );
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
