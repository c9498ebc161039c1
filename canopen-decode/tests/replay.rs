use std::fs;
use std::path::PathBuf;

use canopen_decode::node::nmt::NmtState;
use canopen_decode::{BusManager, ConfigError, ObjectDictionary, ReplayStats, TraceError, Value};

const DRIVE_EDS: &str = "\
[FileInfo]
FileName=drive.eds
EDSVersion=4.0

[DeviceInfo]
VendorName=Acme
ProductName=Drive X1

[1000]
ParameterName=Device type
ObjectType=0x7
DataType=0x0007
AccessType=ro
DefaultValue=0x00020192

[1008]
ParameterName=Device name
ObjectType=0x7
DataType=0x0009
AccessType=const
DefaultValue=Drive

[1018]
ParameterName=Identity
ObjectType=0x9
SubNumber=2

[1018sub0]
ParameterName=Highest sub-index
DataType=0x0005
AccessType=ro
DefaultValue=1

[1018sub1]
ParameterName=Vendor-ID
DataType=0x0007
AccessType=ro
DefaultValue=0x0000029C

[1800]
ParameterName=TPDO1 communication
ObjectType=0x9
SubNumber=2

[1800sub0]
DataType=0x0005
DefaultValue=1

[1800sub1]
ParameterName=COB-ID
DataType=0x0007
DefaultValue=$NODEID+0x280

[1A00]
ParameterName=TPDO1 mapping
ObjectType=0x9
SubNumber=3

[1A00sub0]
DataType=0x0005
DefaultValue=2

[1A00sub1]
DataType=0x0007
DefaultValue=0x20000010

[1A00sub2]
DataType=0x0007
DefaultValue=0x20010008

[2000]
ParameterName=Speed
ObjectType=0x7
DataType=0x0006
AccessType=rw
DefaultValue=0

[2001]
ParameterName=Mode
ObjectType=0x7
DataType=0x0005
AccessType=rw
DefaultValue=0
";

/// Writes `contents` to a file unique to this test run.
fn scratch_file(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("canopen-decode-{}-{}", std::process::id(), name));
    fs::write(&path, contents).unwrap();
    path
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn loads_identity_object() {
    init_logging();
    let path = scratch_file("identity.eds", DRIVE_EDS);
    let dictionary = ObjectDictionary::load(&path).unwrap();

    assert_eq!(dictionary.entry(0x1018, 0).unwrap().value(), Some(Value::Integer(1)));
    assert_eq!(dictionary.entry(0x1018, 1).unwrap().value(), Some(Value::Integer(0x29C)));
    assert_eq!(dictionary.entry(0x1008, 0).unwrap().value(), Some(Value::Text("Drive".to_string())));
    assert!(dictionary.parameter("deviceinfo").is_some());
    assert!(dictionary.warnings().is_empty());
    fs::remove_file(path).unwrap();
}

#[test]
fn rejects_unknown_dictionary_format() {
    let mut bus = BusManager::new();
    let result = bus.configure_node(1, 5, "drive.xdd");
    assert!(matches!(result, Err(ConfigError::UnsupportedExtension(_))));
}

#[test]
fn replays_pdo_through_remapped_cob_id() {
    init_logging();
    let eds = scratch_file("remap.eds", DRIVE_EDS);
    let trace = scratch_file(
        "remap.log",
        "(0.100000) 1 000#0105\n\
         (0.200000) 1 285#E80302\n",
    );

    let mut bus = BusManager::new();
    bus.configure_node(1, 5, &eds).unwrap();
    let stats = bus.replay_trace_file(&trace, None).unwrap();

    assert_eq!(stats, ReplayStats { frames: 2, stored: 2, skipped: 0 });
    assert_eq!(bus.lookup(1, 5, 0x2000, 0).unwrap().last(), &Value::Integer(1000));
    assert_eq!(bus.lookup(1, 5, 0x2001, 0).unwrap().last(), &Value::Integer(2));
    let node = bus.channel(1).unwrap().node(5).unwrap();
    assert_eq!(node.nmt_state(), Some(NmtState::Operational));

    fs::remove_file(eds).unwrap();
    fs::remove_file(trace).unwrap();
}

#[test]
fn replays_segmented_sdo_upload() {
    init_logging();
    let eds = scratch_file("segmented.eds", DRIVE_EDS);
    let trace = scratch_file(
        "segmented.log",
        "(1.000000) 1 605#4008100000000000\n\
         (1.001000) 1 585#4108100008000000\n\
         (1.002000) 1 605#6000000000000000\n\
         (1.003000) 1 585#0044726976652058\n\
         (1.004000) 1 605#7000000000000000\n\
         (1.005000) 1 585#0131000000000000\n",
    );

    let mut bus = BusManager::new();
    bus.configure_node(1, 5, &eds).unwrap();
    let stats = bus.replay_trace_file(&trace, None).unwrap();

    assert_eq!(stats.stored, 6);
    let name = bus.lookup(1, 5, 0x1008, 0).unwrap();
    assert_eq!(name.last(), &Value::Text("Drive X1".to_string()));
    assert_eq!(name.history().len(), 2);

    fs::remove_file(eds).unwrap();
    fs::remove_file(trace).unwrap();
}

#[test]
fn drops_expedited_response_with_dirty_padding() {
    init_logging();
    let eds = scratch_file("padding.eds", DRIVE_EDS);
    let trace = scratch_file(
        "padding.log",
        "(1.0) 1 585#4B00200034120000\n\
         (2.0) 1 585#4B002000341200FF\n",
    );

    let mut bus = BusManager::new();
    bus.configure_node(1, 5, &eds).unwrap();
    let stats = bus.replay_trace_file(&trace, None).unwrap();

    assert_eq!(stats.stored, 1);
    let speed = bus.lookup(1, 5, 0x2000, 0).unwrap();
    assert_eq!(speed.last(), &Value::Integer(0x1234));
    assert_eq!(speed.history().last().unwrap().0, 1.0);

    fs::remove_file(eds).unwrap();
    fs::remove_file(trace).unwrap();
}

#[test]
fn nmt_broadcast_reaches_every_configured_node() {
    init_logging();
    let eds = scratch_file("broadcast.eds", DRIVE_EDS);
    let trace = scratch_file(
        "broadcast.log",
        "(0.1) 1 000#8000\n\
         (0.2) 1 000#0107\n",
    );

    let mut bus = BusManager::new();
    bus.configure_node(1, 5, &eds).unwrap();
    bus.configure_node(1, 6, &eds).unwrap();
    assert_eq!(bus.dictionaries().len(), 1);
    bus.replay_trace_file(&trace, None).unwrap();

    for node in [5, 6] {
        let node = bus.channel(1).unwrap().node(node).unwrap();
        assert_eq!(node.nmt_state(), Some(NmtState::Operational));
    }
    assert_eq!(bus.channel(1).unwrap().raw_frames(0x000).len(), 2);

    fs::remove_file(eds).unwrap();
    fs::remove_file(trace).unwrap();
}

#[test]
fn replays_vector_ascii_onto_chosen_channel() {
    init_logging();
    let trace = scratch_file(
        "vector.asc",
        "date Sat Oct 17 09:12:44 am 2026\n\
         base hex  timestamps absolute\n\
         internal events logged\n\
         Begin Triggerblock Sat Oct 17 09:12:44 am 2026\n\
            0.000000 Start of measurement\n\
            0.010000 1  705             Rx   d 1 00\n\
            0.020000 1  705             Rx   d 1 7F\n\
            0.030000 1  ErrorFrame\n\
         End TriggerBlock\n",
    );

    let mut bus = BusManager::new();
    let stats = bus.replay_trace_file(&trace, Some(3)).unwrap();

    assert_eq!(stats, ReplayStats { frames: 2, stored: 2, skipped: 0 });
    assert_eq!(bus.channel_ids().collect::<Vec<_>>(), vec![3]);
    assert_eq!(bus.channel(3).unwrap().raw_frames(0x705).len(), 2);

    fs::remove_file(trace).unwrap();
}

#[test]
fn missing_trace_file_is_an_error() {
    let mut bus = BusManager::new();
    let result = bus.replay_trace_file("/nonexistent/trace.log", None);
    assert!(matches!(result, Err(TraceError::Io { .. })));
}
