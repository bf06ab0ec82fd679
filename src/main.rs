use gradeflow::{run, supported_roles, RunOptions};

fn parse_args() -> Result<RunOptions, String> {
    let mut role = None;
    let mut host = None;
    let mut port = None;
    let mut dry_run_startup = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--role" => role = Some(args.next().ok_or("--role requires a value")?),
            "--host" => host = Some(args.next().ok_or("--host requires a value")?),
            "--port" => {
                let value = args.next().ok_or("--port requires a value")?;
                port = Some(value.parse::<u16>().map_err(|_| format!("invalid port: {value}"))?);
            }
            "--dry-run-startup" => dry_run_startup = true,
            other => {
                if let Some(value) = other.strip_prefix("--role=") {
                    role = Some(value.to_string());
                } else if let Some(value) = other.strip_prefix("--host=") {
                    host = Some(value.to_string());
                } else if let Some(value) = other.strip_prefix("--port=") {
                    port =
                        Some(value.parse::<u16>().map_err(|_| format!("invalid port: {value}"))?);
                } else {
                    return Err(format!("unknown argument: {other}"));
                }
            }
        }
    }

    let role = role.ok_or("--role is required")?;
    Ok(RunOptions { role, host, port, dry_run_startup })
}

#[tokio::main]
async fn main() {
    let options = match parse_args() {
        Ok(options) => options,
        Err(message) => {
            eprintln!("ERROR: {message}");
            eprintln!("Try one of: {}", supported_roles().join(", "));
            std::process::exit(2);
        }
    };

    if !supported_roles().contains(&options.role.as_str()) {
        eprintln!("ERROR: unsupported role '{}'", options.role);
        eprintln!("Try one of: {}", supported_roles().join(", "));
        eprintln!("Note: the schema migrator is external and not an app role.");
        std::process::exit(2);
    }

    if let Err(err) = run(options).await {
        eprintln!("gradeflow fatal: {err:#}");
        std::process::exit(1);
    }
}
