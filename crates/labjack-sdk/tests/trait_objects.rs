use labjack_sdk::{diag, Ljm, MockLjm, MockU12, OpenSpec, RegisterType, SdkError, U12};
use std::sync::Arc;

fn sdk() -> Arc<dyn Ljm> {
    Arc::new(MockLjm::t7())
}

#[test]
fn register_tables_through_trait_object() -> anyhow::Result<()> {
    let ljm = sdk();
    assert_eq!(ljm.name_to_address("DAC0")?, (1000, RegisterType::Float32));
    assert_eq!(ljm.address_to_type(60500)?, RegisterType::String);
    assert_eq!(
        ljm.name_to_address("NOPE"),
        Err(SdkError::UnknownName("NOPE".into()))
    );
    assert_eq!(ljm.address_to_type(7), Err(SdkError::UnknownAddress(7)));
    Ok(())
}

#[test]
fn closed_handles_are_rejected() -> anyhow::Result<()> {
    let ljm = sdk();
    let handle = ljm.open(&OpenSpec::any())?;
    ljm.write_value(handle, 1000, RegisterType::Float32, 1.0)?;
    ljm.close(handle)?;
    let err = ljm
        .read_value(handle, 1000, RegisterType::Float32)
        .unwrap_err();
    assert_eq!(err.code(), Some(1224));
    assert_eq!(ljm.error_to_string(1224), "LJME_DEVICE_NOT_OPEN");
    assert!(ljm.handle_info(handle).is_err());
    Ok(())
}

#[test]
fn info_report_for_open_handle() -> anyhow::Result<()> {
    let ljm = sdk();
    let handle = ljm.open(&OpenSpec::new("LJM_dtT7", "LJM_ctUSB", "LJM_idANY"))?;
    let report = diag::device_info_report(&ljm.handle_info(handle)?);
    assert!(report.starts_with("deviceType: LJM_dtT7\n"));
    assert!(report.contains("connectionType: LJM_ctUSB"));
    Ok(())
}

#[test]
fn u12_first_found_unit_reports_its_id() -> anyhow::Result<()> {
    let u12: Arc<dyn U12> = Arc::new(MockU12::new().with_local_id(3));
    assert_eq!(u12.analog_out(-1, None, Some(2.0))?, 3);
    assert_eq!(u12.digital_out(5, 1, false, true)?, 5);
    assert!(u12.digital_in(-1, 1, false)?.state);
    Ok(())
}
