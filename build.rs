// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn package_arg() -> Arg {
    Arg::new("package").required(true).help("Package name, optionally with :arch")
}

fn build_cli() -> Command {
    Command::new("debcache")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Debcache Contributors")
        .about("Inspect a Debian package cache and simulate changes")
        .subcommand_required(true)
        .arg(
            Arg::new("status")
                .long("status")
                .value_name("PATH")
                .default_value("/var/lib/dpkg/status")
                .help("dpkg status file"),
        )
        .arg(
            Arg::new("packages")
                .long("packages")
                .value_name("PATH")
                .action(ArgAction::Append)
                .help("Packages index (plain or .gz), may be given more than once"),
        )
        .arg(
            Arg::new("sources")
                .long("sources")
                .value_name("PATH")
                .action(ArgAction::Append)
                .help("Sources index used for source downloads and changelogs"),
        )
        .arg(
            Arg::new("mirror")
                .long("mirror")
                .default_value("http://deb.debian.org/debian")
                .help("Mirror the indexes belong to"),
        )
        .arg(
            Arg::new("origin")
                .long("origin")
                .default_value("Debian")
                .help("Origin of the mirror"),
        )
        .arg(
            Arg::new("dpkg_dir")
                .long("dpkg-dir")
                .value_name("PATH")
                .default_value("/var/lib/dpkg")
                .help("dpkg administrative directory holding info/<package>.list"),
        )
        .arg(Arg::new("suite").long("suite").default_value("stable").help("Suite of the mirror"))
        .arg(Arg::new("arch").long("arch").help("Native architecture"))
        .arg(
            Arg::new("no_install_recommends")
                .long("no-install-recommends")
                .action(ArgAction::SetTrue)
                .help("Do not auto-install Recommends"),
        )
        .subcommand(
            Command::new("show")
                .about("Show the record of a package's candidate version")
                .arg(package_arg())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print JSON instead of the control stanza"),
                ),
        )
        .subcommand(
            Command::new("policy")
                .about("Show installed and candidate versions and their priorities")
                .arg(package_arg()),
        )
        .subcommand(
            Command::new("simulate")
                .about("Mark packages and report the resulting changes without applying them")
                .subcommand(
                    Command::new("install").arg(Arg::new("packages").action(ArgAction::Append)),
                )
                .subcommand(
                    Command::new("remove")
                        .arg(Arg::new("packages").action(ArgAction::Append))
                        .arg(
                            Arg::new("purge")
                                .long("purge")
                                .action(ArgAction::SetTrue)
                                .help("Also remove configuration files"),
                        ),
                )
                .subcommand(
                    Command::new("upgrade")
                        .about("Upgrade the given packages, or every upgradable package")
                        .arg(Arg::new("packages").action(ArgAction::Append)),
                ),
        )
        .subcommand(
            Command::new("download")
                .about("Download the candidate .deb or its source package")
                .arg(package_arg())
                .arg(
                    Arg::new("dest")
                        .short('d')
                        .long("dest")
                        .default_value(".")
                        .help("Destination directory"),
                )
                .arg(
                    Arg::new("source")
                        .long("source")
                        .action(ArgAction::SetTrue)
                        .help("Fetch the source package instead of the binary"),
                )
                .arg(
                    Arg::new("unpack")
                        .long("unpack")
                        .action(ArgAction::SetTrue)
                        .help("Unpack the source package with dpkg-source"),
                ),
        )
        .subcommand(
            Command::new("files")
                .about("List the files dpkg installed for a package")
                .arg(package_arg()),
        )
        .subcommand(
            Command::new("changelog")
                .about("Show the changes since the installed version")
                .arg(package_arg())
                .arg(
                    Arg::new("uri")
                        .long("uri")
                        .help("URI template with {src_section}, {prefix}, {src_pkg} and {src_ver}"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("debcache.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
