use std::path::PathBuf;

const HELP: &str = "spreadtv — Kiosk client for backend-managed displays.

  --config <path>      Read configuration from <path>
  --check-links        Fetch the display list once, print it and exit
  --version, -V        Show version and exit
  --help,    -h        Show this help message";

#[derive(Debug, Default)]
struct Cli {
    config_file: Option<PathBuf>,
    check_links: bool,
    show_version: bool,
    show_help: bool,
}

fn main() {
    let cli = match parse_args(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(message) => {
            eprintln!("error: {message}\n\n{HELP}");
            std::process::exit(2);
        }
    };

    if cli.show_version {
        println!("spreadtv {}", spreadtv::VERSION);
        return;
    }
    if cli.show_help {
        println!("{HELP}");
        return;
    }

    let options = spreadtv::app::RunOptions {
        config_file: cli.config_file,
    };

    if cli.check_links {
        if let Err(err) = check_links_once(options) {
            eprintln!("Link check failed: {err:?}");
            std::process::exit(1);
        }
        return;
    }

    if let Err(err) = spreadtv::run_with(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Cli, String> {
    let mut cli = Cli::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => cli.show_version = true,
            "--help" | "-h" => cli.show_help = true,
            "--check-links" => cli.check_links = true,
            "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| "--config needs a path".to_string())?;
                cli.config_file = Some(PathBuf::from(path));
            }
            other => {
                if let Some(path) = other.strip_prefix("--config=") {
                    cli.config_file = Some(PathBuf::from(path));
                } else {
                    return Err(format!("unknown argument {other}"));
                }
            }
        }
    }
    Ok(cli)
}

fn check_links_once(options: spreadtv::app::RunOptions) -> anyhow::Result<()> {
    let links = spreadtv::app::check_links(options)?;
    if links.is_empty() {
        println!("No displays configured.");
    }
    for (id, url) in links.iter() {
        println!("{id}\t{url}");
    }
    Ok(())
}
