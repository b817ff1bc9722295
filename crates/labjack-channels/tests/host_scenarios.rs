use labjack_channels::{
    ljm, loader, u12, ChannelError, ChannelHost, MetricsHub, Param, RegisterOptions, Reply,
};
use labjack_sdk::{Handle, MockCall, MockLjm, MockU12, MockValue, RegisterType};
use std::sync::Arc;

fn ljm_host() -> (Arc<MockLjm>, ChannelHost) {
    let sdk = Arc::new(MockLjm::t7());
    let mut host = ChannelHost::new().with_metrics(MetricsHub::new().unwrap());
    ljm::install(&mut host, sdk.clone(), RegisterOptions::default());
    (sdk, host)
}

#[test]
fn float_register_by_name_on_device_five() -> anyhow::Result<()> {
    let (sdk, mut host) = ljm_host();
    host.run_script(
        "create mem m1\ncreate mem m2\ncreate mem m3\ncreate mem m4\ncreate ljmdev dev\n",
    )?;
    assert_eq!(host.channel_id("dev").map(|id| id.0), Some(5));

    host.run_script("setup dev\ncreate ljmreg ain\n")?;
    assert_eq!(sdk.calls(), vec![MockCall::Open(labjack_sdk::OpenSpec::any())]);
    sdk.clear_calls();

    host.run_script("setup ain 5 AIN0\nwrite ain 2.5\n")?;
    assert_eq!(
        sdk.calls(),
        vec![
            MockCall::NameToAddress("AIN0".into()),
            MockCall::WriteValue {
                handle: Handle(1),
                address: 0,
                ty: RegisterType::Float32,
                value: 2.5
            },
        ]
    );
    assert_eq!(host.execute_line("read ain")?, Some(Reply::Float(2.5)));
    Ok(())
}

#[test]
fn byte_register_with_length_round_trips() -> anyhow::Result<()> {
    let (sdk, mut host) = ljm_host();
    host.run_script(
        "create ljmdev dev\nsetup dev\ncreate ljmreg lua\n\
         setup lua dev LUA_SOURCE_WRITE LJM_BYTE LUA_SOURCE_SIZE\n",
    )?;
    sdk.clear_calls();

    host.run_script("write lua 0123456789\n")?;
    assert_eq!(
        sdk.calls(),
        vec![
            MockCall::WriteValue {
                handle: Handle(1),
                address: 6012,
                ty: RegisterType::Uint32,
                value: 10.0
            },
            MockCall::WriteByteArray {
                handle: Handle(1),
                address: 6014,
                bytes: b"0123456789".to_vec()
            },
        ]
    );
    assert_eq!(sdk.value(6012), Some(MockValue::Number(10.0)));
    assert_eq!(
        host.execute_line("read lua")?,
        Some(Reply::Buffer(b"0123456789".to_vec()))
    );
    Ok(())
}

#[test]
fn read_and_publish_is_idempotent() -> anyhow::Result<()> {
    let (sdk, mut host) = ljm_host();
    host.run_script(
        "create ljmdev dev\nsetup dev\ncreate ljmreg dac\nsetup dac dev DAC1\n\
         create mem last\nlink dac last\n",
    )?;
    sdk.set_value(1002, MockValue::Number(3.25));
    let first = host.execute_line("write dac")?;
    let seen = host.execute_line("read last")?;
    let second = host.execute_line("write dac")?;
    assert_eq!(first, Some(Reply::Float(3.25)));
    assert_eq!(first, second);
    assert_eq!(seen, Some(Reply::Float(3.25)));
    assert_eq!(host.execute_line("read last")?, seen);
    assert_eq!(host.metrics().map(|m| m.publishes.get()), Some(2));
    Ok(())
}

#[test]
fn type_override_tokens_select_the_write_path() -> anyhow::Result<()> {
    let numeric = [
        ("LJM_UINT16", RegisterType::Uint16),
        ("LJM_UINT32", RegisterType::Uint32),
        ("LJM_INT32", RegisterType::Int32),
        ("LJM_FLOAT32", RegisterType::Float32),
        ("LJM_DOUBLE", RegisterType::Float32),
    ];
    for (token, ty) in numeric {
        let (sdk, mut host) = ljm_host();
        host.run_script(&format!(
            "create ljmdev dev\nsetup dev\ncreate ljmreg r\nsetup r dev AIN1 {token}\n"
        ))?;
        sdk.clear_calls();
        host.execute_line("write r 7")?;
        assert_eq!(
            sdk.calls(),
            vec![MockCall::WriteValue {
                handle: Handle(1),
                address: 2,
                ty,
                value: 7.0
            }],
            "token {token}"
        );
    }

    for token in ["LJM_STRING", "BYTE_ARRAY"] {
        let (sdk, mut host) = ljm_host();
        host.run_script(&format!(
            "create ljmdev dev\nsetup dev\ncreate ljmreg r\nsetup r dev AIN1 {token}\n"
        ))?;
        sdk.clear_calls();
        host.execute_line("write r 7")?;
        assert_eq!(
            sdk.calls(),
            vec![MockCall::WriteString {
                handle: Handle(1),
                address: 2,
                value: "7".into()
            }],
            "token {token}"
        );
    }

    let (sdk, mut host) = ljm_host();
    host.run_script("create ljmdev dev\nsetup dev\ncreate ljmreg r\nsetup r dev AIN1 LJM_BYTE\n")?;
    sdk.clear_calls();
    host.execute_line("write r 7")?;
    assert_eq!(
        sdk.calls(),
        vec![MockCall::WriteByteArray {
            handle: Handle(1),
            address: 2,
            bytes: b"7".to_vec()
        }]
    );
    Ok(())
}

#[test]
fn short_setup_leaves_register_unconfigured() -> anyhow::Result<()> {
    let (sdk, mut host) = ljm_host();
    host.run_script("create ljmdev dev\nsetup dev\ncreate ljmreg r\n")?;
    sdk.clear_calls();
    host.execute_line("setup r dev")?;
    assert!(sdk.calls().is_empty());
    assert_eq!(host.execute_line("read r"), Err(ChannelError::NotConfigured));
    Ok(())
}

#[test]
fn vendor_failure_is_reported_not_fatal() -> anyhow::Result<()> {
    let (sdk, mut host) = ljm_host();
    host.run_script(
        "create ljmdev dev\nsetup dev\ncreate ljmreg a\nsetup a dev AIN0\n\
         create ljmreg b\nsetup b dev AIN1\n",
    )?;
    sdk.fail_at(0, 2331);
    assert_eq!(
        host.execute_line("read a"),
        Err(ChannelError::Vendor {
            code: 2331,
            address: Some(0)
        })
    );
    assert_eq!(host.execute_line("read b")?, Some(Reply::Float(0.0)));
    assert_eq!(host.metrics().map(|m| m.vendor_errors.get()), Some(1));
    Ok(())
}

#[test]
fn station_file_builds_a_working_host() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("station.yaml");
    std::fs::write(
        &path,
        "devices: [{name: t7}]\n\
         registers:\n\
         \x20 - {name: dac0, device: t7, register: 1000}\n\
         \x20 - {name: tag, device: t7, register: DEVICE_NAME_DEFAULT}\n\
         memories: [copy]\n\
         links: [{from: dac0, to: copy}]\n",
    )?;
    let station = loader::load_station_file(&path)?;
    let (sdk, mut host) = ljm_host();
    for cmd in station.to_commands() {
        host.execute(cmd)?;
    }
    sdk.set_value(1000, MockValue::Number(4.5));
    host.execute_line("write dac0")?;
    assert_eq!(host.execute_line("read copy")?, Some(Reply::Float(4.5)));

    host.execute_line("write tag \"bench 7\"")?;
    assert_eq!(host.execute_line("read tag")?, Some(Reply::Text("bench 7".into())));
    Ok(())
}

#[test]
fn u12_input_drives_linked_output() -> anyhow::Result<()> {
    let sdk = Arc::new(MockU12::new().with_local_id(2));
    let mut host = ChannelHost::new();
    u12::install(&mut host, sdk.clone());
    host.run_script("create ljai ai 4\nsetup ai 4 1\ncreate ljao ao 0\nlink ai ao\n")?;
    sdk.set_analog_input(4, 1.5);
    host.execute_line("write ai")?;
    assert_eq!(sdk.analog_outputs(), [1.5, 0.0]);
    assert_eq!(host.execute_line("read ao")?, Some(Reply::Float(1.5)));
    assert_eq!(host.execute_line("read ai")?, Some(Reply::Float(1.5)));
    Ok(())
}

#[test]
fn typed_commands_match_text_commands() -> anyhow::Result<()> {
    let (_, mut host) = ljm_host();
    host.execute(labjack_channels::Command::Create {
        class: "mem".into(),
        name: "m".into(),
        params: vec![Param::Int(9)],
    })?;
    assert_eq!(host.execute_line("read m")?, Some(Reply::Int(9)));
    Ok(())
}

#[test]
fn device_named_with_leading_digit_is_found_by_name() -> anyhow::Result<()> {
    let (sdk, mut host) = ljm_host();
    host.run_script(
        "create ljmdev a\nsetup a\ncreate ljmdev 1b\nsetup 1b\n\
         create ljmreg r\nsetup r 1b DAC0\n",
    )?;
    sdk.clear_calls();
    host.execute_line("write r 2.5")?;
    assert_eq!(
        sdk.calls(),
        vec![MockCall::WriteValue {
            handle: Handle(2),
            address: 1000,
            ty: RegisterType::Float32,
            value: 2.5
        }]
    );
    Ok(())
}
