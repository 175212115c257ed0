use std::path::PathBuf;

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    folder: Option<PathBuf>,
    volume: Option<u8>,
    no_art: bool,
    help: bool,
}

fn main() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1).collect())?;
    if args.help {
        print_help();
        return Ok(());
    }

    mp3deck::app::run_with_startup(mp3deck::app::AppStartupOptions {
        folder: args.folder,
        volume_percent: args.volume,
        disable_art: args.no_art,
    })
}

fn parse_args(args: Vec<String>) -> anyhow::Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--volume" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--volume requires a value between 0 and 100");
                };
                let volume: u8 = value
                    .trim()
                    .parse()
                    .map_err(|_| anyhow::anyhow!("--volume expects 0-100, got {value}"))?;
                if volume > 100 {
                    anyhow::bail!("--volume expects 0-100, got {volume}");
                }
                out.volume = Some(volume);
            }
            "--no-art" => out.no_art = true,
            "-h" | "--help" => out.help = true,
            other if other.starts_with('-') => anyhow::bail!("unknown argument {other}"),
            folder => {
                if out.folder.is_some() {
                    anyhow::bail!("only one folder may be given");
                }
                out.folder = Some(PathBuf::from(folder));
            }
        }
        index += 1;
    }
    Ok(out)
}

fn print_help() {
    println!("mp3deck [FOLDER] [options]");
    println!("  FOLDER            Folder of .mp3 files to open (defaults to the last one)");
    println!("  --volume N        Start volume, 0-100");
    println!("  --no-art          Do not read embedded album art");
    println!("  -h, --help        Show this help");
}
