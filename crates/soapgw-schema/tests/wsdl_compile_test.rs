use httpmock::prelude::*;
use serde_json::json;
use soapgw_schema::{
    Error, FieldType, OperationCache, RecordKind, ScalarType, WsdlLoader, compile_operation,
};
use std::path::PathBuf;

fn testdata(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../testdata")
        .join(name)
}

fn load(name: &str) -> soapgw_schema::WsdlDocument {
    WsdlLoader::load_file(&testdata(name)).expect("fixture WSDL should parse")
}

#[test]
fn test_tempconvert_operation_records() {
    let doc = load("tempconvert.wsdl");
    let compiled = compile_operation(&doc, "tempconvert.wsdl", "CelsiusToFahrenheit").unwrap();

    assert_eq!(
        compiled.soap_action.as_deref(),
        Some("https://www.w3schools.com/xml/CelsiusToFahrenheit")
    );

    let root = compiled.output.record("CelsiusToFahrenheitResponse").unwrap();
    assert_eq!(root.kind, RecordKind::Complex);
    assert_eq!(root.fields.len(), 1);
    assert_eq!(root.fields[0].name, "CelsiusToFahrenheitResult");
    assert_eq!(root.fields[0].field_type, FieldType::Scalar(ScalarType::String));

    // Every complex type of the document is emitted, not only the reachable ones
    for name in [
        "CelsiusToFahrenheit",
        "CelsiusToFahrenheitResponse",
        "FahrenheitToCelsius",
        "FahrenheitToCelsiusResponse",
    ] {
        assert!(compiled.output.record(name).is_some(), "missing record {name}");
    }

    let paths: Vec<String> = compiled.output_paths().into_iter().collect();
    assert_eq!(paths, vec!["CelsiusToFahrenheitResult"]);
    let inputs: Vec<String> = compiled.input_paths().into_iter().collect();
    assert_eq!(inputs, vec!["Celsius"]);
}

#[test]
fn test_tempconvert_decodes_response() {
    let doc = load("tempconvert.wsdl");
    let compiled = compile_operation(&doc, "tempconvert.wsdl", "CelsiusToFahrenheit").unwrap();

    let envelope = r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <CelsiusToFahrenheitResponse xmlns="https://www.w3schools.com/xml/">
      <CelsiusToFahrenheitResult>212</CelsiusToFahrenheitResult>
    </CelsiusToFahrenheitResponse>
  </soap:Body>
</soap:Envelope>"#;

    let value = compiled.decode_response(envelope).unwrap();
    assert_eq!(value, json!({"CelsiusToFahrenheitResult": "212"}));
}

#[test]
fn test_country_info_nested_paths() {
    let doc = load("countries.wsdl");
    let compiled = compile_operation(&doc, "countries.wsdl", "FullCountryInfo").unwrap();
    let paths = compiled.output_paths();

    for expected in [
        "FullCountryInfoResult",
        "FullCountryInfoResult.SName",
        "FullCountryInfoResult.SCapitalCity",
        "FullCountryInfoResult.Languages",
        "FullCountryInfoResult.Languages.TLanguage",
        "FullCountryInfoResult.Languages.TLanguage.SISOCode",
    ] {
        assert!(paths.contains(expected), "missing path {expected}");
    }

    let languages = compiled.output.record("ArrayOftLanguage").unwrap();
    assert_eq!(
        languages.fields[0].field_type,
        FieldType::list(FieldType::Record("tLanguage".to_string()))
    );
    // Reachable only from the other operation
    assert!(compiled.output.record("ArrayOftCountryCodeAndName").is_some());
    // Empty soapAction attributes are treated as absent
    assert!(compiled.soap_action.is_none());
}

#[test]
fn test_country_list_decodes_repeated_elements() {
    let doc = load("countries.wsdl");
    let compiled =
        compile_operation(&doc, "countries.wsdl", "ListOfCountryNamesByCode").unwrap();

    let envelope = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <m:ListOfCountryNamesByCodeResponse xmlns:m="http://www.oorsprong.org/websamples.countryinfo">
      <m:ListOfCountryNamesByCodeResult>
        <m:tCountryCodeAndName><m:sISOCode>AD</m:sISOCode><m:sName>Andorra</m:sName></m:tCountryCodeAndName>
        <m:tCountryCodeAndName><m:sISOCode>AE</m:sISOCode><m:sName>United Arab Emirates</m:sName></m:tCountryCodeAndName>
      </m:ListOfCountryNamesByCodeResult>
    </m:ListOfCountryNamesByCodeResponse>
  </soap:Body>
</soap:Envelope>"#;

    let value = compiled.decode_response(envelope).unwrap();
    assert_eq!(
        value,
        json!({
            "ListOfCountryNamesByCodeResult": {
                "TCountryCodeAndName": [
                    {"SISOCode": "AD", "SName": "Andorra"},
                    {"SISOCode": "AE", "SName": "United Arab Emirates"}
                ]
            }
        })
    );
}

#[test]
fn test_unknown_operation_is_not_found() {
    let doc = load("tempconvert.wsdl");
    let err = compile_operation(&doc, "tempconvert.wsdl", "KelvinToRankine").unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_remote_wsdl_fetch() {
    let body = std::fs::read_to_string(testdata("tempconvert.wsdl")).unwrap();
    let server = MockServer::start();
    let _m = server.mock(|when, then| {
        when.method(GET).path("/tempconvert.asmx");
        then.status(200).body(&body);
    });

    let cache = OperationCache::default();
    let location = format!("{}/tempconvert.asmx", server.base_url());
    let compiled = cache
        .get_or_compile(&location, "FahrenheitToCelsius")
        .await
        .unwrap();
    assert_eq!(compiled.operation, "FahrenheitToCelsius");
    assert!(compiled.output_paths().contains("FahrenheitToCelsiusResult"));
}

#[tokio::test]
async fn test_remote_wsdl_error_status() {
    let server = MockServer::start();
    let _m = server.mock(|when, then| {
        when.method(GET).path("/missing");
        then.status(404);
    });

    let loader = WsdlLoader::new();
    let err = loader
        .load(&format!("{}/missing", server.base_url()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert!(err.to_string().contains("404"));
}
