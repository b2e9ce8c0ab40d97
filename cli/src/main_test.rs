#![allow(clippy::float_cmp)]

use mapkit::layer::LayerSource;

use super::*;

fn print_args(extra: &[&str]) -> PrintArgs {
    let mut argv = vec!["print-cli", "--url", "http://print.test/print", "print"];
    argv.extend_from_slice(extra);
    match Cli::try_parse_from(argv).unwrap().command {
        Command::Print(args) => args,
        other => panic!("expected print command, got {other:?}"),
    }
}

// =============================================================================
// argument parsing
// =============================================================================

#[test]
fn defaults() {
    let cli = Cli::try_parse_from(["print-cli", "--url", "http://print.test/print", "apps"]).unwrap();
    assert_eq!(cli.protocol, Protocol::V3);
    assert_eq!(cli.method, PrintMethod::Post);
    assert_eq!(cli.credentials, CredentialsMode::SameOrigin);
    assert_eq!(cli.timeout_ms, 30_000);
    assert!(cli.headers.is_empty());
}

#[test]
fn headers_and_protocol() {
    let cli = Cli::try_parse_from([
        "print-cli",
        "--url",
        "http://print.test/print",
        "--protocol",
        "v2",
        "--method",
        "GET",
        "--header",
        "X-Client=cli",
        "--header",
        "Authorization = Bearer t",
        "capabilities",
    ])
    .unwrap();
    assert_eq!(cli.protocol, Protocol::V2);
    assert_eq!(cli.method, PrintMethod::Get);
    assert_eq!(
        cli.headers,
        vec![("X-Client".to_owned(), "cli".to_owned()), ("Authorization".to_owned(), "Bearer t".to_owned())]
    );
    let config = build_config(&cli);
    assert_eq!(config.url, "http://print.test/print/");
    assert_eq!(config.headers.len(), 2);
}

#[test]
fn bad_header_is_rejected() {
    assert!(parse_header("no-equals").is_err());
    assert!(parse_header("=value").is_err());
    assert!(
        Cli::try_parse_from(["print-cli", "--url", "http://x", "--header", "oops", "apps"]).is_err()
    );
}

#[test]
fn point_parsing() {
    assert_eq!(parse_point("-100.5, 20"), Ok(Point::new(-100.5, 20.0)));
    assert!(parse_point("1;2").is_err());
    assert!(parse_point("a,2").is_err());
}

#[test]
fn numbers_choose_by_value() {
    assert_eq!(choice("150"), Choice::Value(150.0));
    assert_eq!(choice("1:25000"), Choice::Name("1:25000"));
}

// =============================================================================
// map building
// =============================================================================

#[test]
fn map_from_layer_flags() {
    let args = print_args(&[
        "--center",
        "-500,250",
        "--wms",
        "http://wms.test/ows#roads, rails",
        "--xyz",
        "https://tile.test/{z}/{x}/{y}.png",
    ]);
    let map = build_map(&args).unwrap();
    assert_eq!(map.view.center, Point::new(-500.0, 250.0));
    assert_eq!(map.layers().len(), 2);
    match &map.layers()[0].source {
        LayerSource::Wms { layers, .. } => assert_eq!(layers, &vec!["roads".to_owned(), "rails".to_owned()]),
        other => panic!("expected WMS, got {other:?}"),
    }
    assert!(matches!(map.layers()[1].source, LayerSource::Xyz { .. }));
}

#[test]
fn wms_without_layers_is_rejected() {
    assert!(build_map(&print_args(&["--wms", "http://wms.test/ows"])).is_err());
    assert!(build_map(&print_args(&["--wms", "http://wms.test/ows#"])).is_err());
}

#[test]
fn resolution_must_be_positive() {
    assert!(matches!(
        build_map(&print_args(&["--resolution", "0"])),
        Err(CliError::InvalidArg(_))
    ));
}

#[test]
fn print_errors_carry_code() {
    let err = CliError::from(PrintError::Cancelled);
    assert_eq!(err.to_string(), "E_CANCELLED: print job was cancelled");
}
