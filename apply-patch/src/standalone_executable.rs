use std::io::Read;
use std::io::Write;

pub fn main() -> ! {
    let exit_code = run_main();
    std::process::exit(exit_code);
}

/// Reads the patch from the first argument, or from stdin when no argument
/// is given, and applies it in the current directory.
pub fn run_main() -> i32 {
    let mut args = std::env::args_os();
    // Skip argv0.
    let _ = args.next();

    let patch_arg = match args.next() {
        Some(arg) => match arg.into_string() {
            Ok(s) => s,
            Err(_) => {
                eprintln!("Error: apply_patch requires a UTF-8 PATCH argument.");
                return 1;
            }
        },
        None => {
            let mut buf = String::new();
            match std::io::stdin().read_to_string(&mut buf) {
                Ok(_) if buf.is_empty() => {
                    eprintln!("Usage: apply_patch 'PATCH'\n       echo 'PATCH' | apply_patch");
                    return 2;
                }
                Ok(_) => buf,
                Err(err) => {
                    eprintln!("Error: Failed to read PATCH from stdin.\n{err}");
                    return 1;
                }
            }
        }
    };

    if args.next().is_some() {
        eprintln!("Error: apply_patch accepts exactly one argument.");
        return 2;
    }

    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let exit_code = match crate::apply_patch(&patch_arg, &mut stdout, &mut stderr) {
        Ok(()) => 0,
        Err(_) => 1,
    };
    // Flush to ensure output ordering when used in pipelines.
    let _ = stdout.flush();
    exit_code
}
