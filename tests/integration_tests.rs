use lorawan_sim::{
    config::device::{AESKey, DeviceConfig, JoinState, MacVersion, SessionKeys},
    crypto::{self, DefaultCrypto},
    device::{Device, DeviceError},
    lorawan::{
        commands::{encode_commands, MacCommand},
        downlink::{DataDownlink, Downlink},
        mac::{DataFrame, MacError},
        phy::CfList,
        region::{Region, EU868},
        uplink::Uplink,
    },
    store::{file::FileStore, memory::MemoryStore, CounterField, CounterStore},
};

use mock::{
    data_downlink, open_uplink_v1_0, otaa_config, otaa_config_v1_1, tx, DownlinkSpec,
    FailingTransport, FlakyStore, MockError, MockNetwork, RecordingTransport, DEV_ADDR,
    DEV_EUI,
};

const JOIN_ACCEPT_V1_0: [u8; 17] = [
    0x20, 0x15, 0xb0, 0xc0, 0xbc, 0x93, 0x3b, 0x43, 0x44, 0xe2, 0x4c, 0x61, 0x9e, 0x4b, 0xeb, 0xcb,
    0x59,
];

fn data(downlink: Downlink) -> DataDownlink {
    match downlink {
        Downlink::Data(data) => data,
        other => panic!("expected a data downlink, got {:?}", other),
    }
}

// Join through the mock network; returns the keys the network derived
fn join<S: CounterStore>(
    device: &mut Device<S, EU868>,
    network: &MockNetwork,
    join_nonce: u32,
    opt_neg: bool,
) -> SessionKeys {
    let mut transport = RecordingTransport::new();
    device.join(&mut transport, &tx()).unwrap();
    let dev_nonce = network.receive_join_request(transport.last().unwrap());
    let accept = network.join_accept(dev_nonce, join_nonce, opt_neg, None);
    device.process_downlink(&accept).unwrap();
    network.session_keys(dev_nonce, join_nonce, opt_neg)
}

fn joined_device() -> (Device<MemoryStore, EU868>, MemoryStore, SessionKeys) {
    let store = MemoryStore::new();
    let config = otaa_config();
    let network = MockNetwork::new(&config);
    let mut device = Device::new(config, store.clone(), EU868::new()).unwrap();
    let keys = join(&mut device, &network, 1, false);
    (device, store, keys)
}

#[test]
fn test_otaa_join_and_first_uplink() {
    let store = MemoryStore::new();
    let mut device = Device::new(otaa_config(), store.clone(), EU868::new()).unwrap();
    let mut transport = RecordingTransport::new();
    assert_eq!(device.join_state(), JoinState::NotJoined);

    device.join(&mut transport, &tx()).unwrap();
    assert_eq!(device.join_state(), JoinState::AwaitingAccept { dev_nonce: 1 });
    assert_eq!(device.dev_nonce(), 1);

    match device.process_downlink(&JOIN_ACCEPT_V1_0).unwrap() {
        Downlink::JoinAccept(accept) => {
            assert_eq!(accept.dev_addr, DEV_ADDR);
            assert_eq!(accept.join_nonce, 1);
        }
        other => panic!("expected a join-accept, got {:?}", other),
    }
    assert!(device.is_joined());
    assert_eq!(device.dev_addr(), DEV_ADDR);
    assert_eq!((device.fcnt_up(), device.fcnt_down()), (0, None));

    let expected = SessionKeys::new_v1_0(
        AESKey::new([
            0xc4, 0x08, 0xda, 0xd3, 0xc1, 0x0b, 0xa4, 0x11, 0x9c, 0x1f, 0xbb, 0x88, 0x16, 0x70,
            0x11, 0xff,
        ]),
        AESKey::new([
            0x36, 0x86, 0x63, 0x9f, 0x40, 0x66, 0xa5, 0xa8, 0x68, 0x1e, 0x1f, 0x4e, 0xaf, 0xe5,
            0xbb, 0xbe,
        ]),
    );
    assert_eq!(device.session_keys(), Some(&expected));

    let fcnt = device
        .send_uplink(&mut transport, &Uplink::new(Some(1), &[0x01, 0x02], tx()))
        .unwrap();
    assert_eq!(fcnt, 1);
    assert_eq!(
        transport.last().unwrap(),
        &[0x40, 0x04, 0x03, 0x02, 0x01, 0x00, 0x01, 0x00, 0x01, 0x0c, 0xfd, 0x96, 0xc5, 0xe2, 0xa5]
    );

    let record = store.get(&DEV_EUI).unwrap().unwrap();
    assert_eq!(record.dev_nonce, 1);
    assert_eq!(record.join_nonce, Some(1));
    assert_eq!(record.fcnt_up, 1);
}

#[test]
fn test_uplinks_use_consecutive_counters() {
    let (mut device, store, keys) = joined_device();
    let mut transport = RecordingTransport::new();

    for expected in 1..=5u32 {
        let payload = [expected as u8; 4];
        let fcnt = device
            .send_uplink(&mut transport, &Uplink::new(Some(10), &payload, tx()))
            .unwrap();
        assert_eq!(fcnt, expected);

        let (frame, plaintext) = open_uplink_v1_0(&keys, transport.last().unwrap());
        assert_eq!(frame.fhdr.f_cnt as u32, expected);
        assert_eq!(frame.f_port, Some(10));
        assert_eq!(plaintext, payload);
    }
    assert_eq!(store.get(&DEV_EUI).unwrap().unwrap().fcnt_up, 5);
}

#[test]
fn test_dev_nonce_persists_before_send() {
    let store = MemoryStore::new();
    let mut device = Device::new(otaa_config(), store.clone(), EU868::new()).unwrap();

    let err = device.join(&mut FailingTransport, &tx()).unwrap_err();
    assert!(matches!(err, DeviceError::Transport(MockError::Offline)));
    assert_eq!(store.get(&DEV_EUI).unwrap().unwrap().dev_nonce, 1);

    let mut transport = RecordingTransport::new();
    device.join(&mut transport, &tx()).unwrap();
    let network = MockNetwork::new(&otaa_config());
    assert_eq!(network.receive_join_request(transport.last().unwrap()), 2);
}

#[test]
fn test_uplink_counter_consumed_when_send_fails() {
    let (mut device, store, _) = joined_device();

    let err = device
        .send_uplink(&mut FailingTransport, &Uplink::new(Some(1), b"lost", tx()))
        .unwrap_err();
    assert!(matches!(err, DeviceError::Transport(MockError::Offline)));
    assert_eq!(store.get(&DEV_EUI).unwrap().unwrap().fcnt_up, 1);

    let mut transport = RecordingTransport::new();
    let fcnt = device
        .send_uplink(&mut transport, &Uplink::new(Some(1), b"sent", tx()))
        .unwrap();
    assert_eq!(fcnt, 2);
}

#[test]
fn test_replayed_join_nonce_is_rejected() {
    let store = MemoryStore::new();
    let config = otaa_config();
    let network = MockNetwork::new(&config);
    let mut device = Device::new(config, store.clone(), EU868::new()).unwrap();
    join(&mut device, &network, 5, false);

    for stale in [5, 4] {
        let frame = device.build_join_request().unwrap();
        let dev_nonce = network.receive_join_request(&frame);
        let err = device
            .process_downlink(&network.join_accept(dev_nonce, stale, false, None))
            .unwrap_err();
        assert!(err.is_security_rejection());
        assert!(matches!(
            err,
            DeviceError::Mac(MacError::ReplayedJoinNonce { last: 5, .. })
        ));
        assert_eq!(device.join_state(), JoinState::NotJoined);
        assert_eq!(store.get(&DEV_EUI).unwrap().unwrap().join_nonce, Some(5));
    }

    let frame = device.build_join_request().unwrap();
    let dev_nonce = network.receive_join_request(&frame);
    device
        .process_downlink(&network.join_accept(dev_nonce, 6, false, None))
        .unwrap();
    assert!(device.is_joined());
    assert_eq!(store.get(&DEV_EUI).unwrap().unwrap().join_nonce, Some(6));
}

#[test]
fn test_join_accept_outside_handshake_is_invalid_state() {
    let mut device = Device::new(otaa_config(), MemoryStore::new(), EU868::new()).unwrap();

    let err = device.process_downlink(&JOIN_ACCEPT_V1_0).unwrap_err();
    assert!(matches!(
        err,
        DeviceError::InvalidState(JoinState::NotJoined)
    ));

    let keys = SessionKeys::new_v1_0(AESKey::new([0; 16]), AESKey::new([0; 16]));
    let downlink = data_downlink(&keys, DEV_ADDR, &DownlinkSpec::new(1, Some(1), b"x"));
    let err = device.process_downlink(&downlink).unwrap_err();
    assert!(matches!(
        err,
        DeviceError::InvalidState(JoinState::NotJoined)
    ));

    let err = device
        .build_uplink(&Uplink::new(Some(1), b"x", tx()))
        .unwrap_err();
    assert!(matches!(
        err,
        DeviceError::InvalidState(JoinState::NotJoined)
    ));
}

#[test]
fn test_join_accept_applies_cf_list() {
    let config = otaa_config();
    let network = MockNetwork::new(&config);
    let mut device = Device::new(config, MemoryStore::new(), EU868::new()).unwrap();

    let frame = device.build_join_request().unwrap();
    let dev_nonce = network.receive_join_request(&frame);
    let cf_list = CfList::Frequencies([867_100_000, 867_300_000, 867_500_000, 0, 0]);
    match device
        .process_downlink(&network.join_accept(dev_nonce, 1, false, Some(cf_list)))
        .unwrap()
    {
        Downlink::JoinAccept(accept) => assert_eq!(accept.cf_list, Some(cf_list)),
        other => panic!("expected a join-accept, got {:?}", other),
    }

    assert_eq!(device.region().channel_index(867_100_000), Some(3));
    assert_eq!(device.region().channel_index(867_500_000), Some(5));
}

#[test]
fn test_downlink_with_wrong_key_is_rejected() {
    let (mut device, store, keys) = joined_device();

    let forged_keys = SessionKeys::new_v1_0(AESKey::new([0x09; 16]), AESKey::new([0x09; 16]));
    let forged = data_downlink(&forged_keys, DEV_ADDR, &DownlinkSpec::new(1, Some(1), b"evil"));
    let err = device.process_downlink(&forged).unwrap_err();
    assert!(matches!(err, DeviceError::Mac(MacError::InvalidMic)));
    assert!(err.is_security_rejection());
    assert_eq!(device.fcnt_down(), None);
    assert_eq!(store.get(&DEV_EUI).unwrap().unwrap().fcnt_down, None);

    let genuine = data_downlink(&keys, DEV_ADDR, &DownlinkSpec::new(1, Some(1), b"good"));
    let downlink = data(device.process_downlink(&genuine).unwrap());
    assert_eq!(&downlink.payload[..], b"good");
    assert_eq!(device.fcnt_down(), Some(1));
}

#[test]
fn test_stale_downlink_counter_is_rejected() {
    let (mut device, store, keys) = joined_device();

    let frame = data_downlink(&keys, DEV_ADDR, &DownlinkSpec::new(3, Some(1), b"three"));
    assert_eq!(data(device.process_downlink(&frame).unwrap()).fcnt, 3);

    let err = device.process_downlink(&frame).unwrap_err();
    assert!(matches!(
        err,
        DeviceError::Mac(MacError::StaleFrameCounter {
            received: 3,
            last: 3
        })
    ));

    for older in [2, 0] {
        let frame = data_downlink(&keys, DEV_ADDR, &DownlinkSpec::new(older, Some(1), b"old"));
        assert!(device.process_downlink(&frame).unwrap_err().is_security_rejection());
    }
    assert_eq!(store.get(&DEV_EUI).unwrap().unwrap().fcnt_down, Some(3));
}

#[test]
fn test_first_downlink_after_join_may_use_counter_zero() {
    let (mut device, store, keys) = joined_device();
    let mut transport = RecordingTransport::new();

    device
        .send_uplink(&mut transport, &Uplink::new(Some(1), b"c", tx()).confirmed())
        .unwrap();

    let mut spec = DownlinkSpec::new(0, Some(1), b"hi");
    spec.ack = true;
    let downlink = data(device.process_downlink(&data_downlink(&keys, DEV_ADDR, &spec)).unwrap());
    assert_eq!(downlink.fcnt, 0);
    assert!(downlink.ack());
    assert_eq!(&downlink.payload[..], b"hi");
    assert_eq!(device.fcnt_down(), Some(0));
    assert_eq!(store.get(&DEV_EUI).unwrap().unwrap().fcnt_down, Some(0));
    assert_eq!(device.session().confirmed_uplink, None);

    let err = device
        .process_downlink(&data_downlink(&keys, DEV_ADDR, &spec))
        .unwrap_err();
    assert!(matches!(
        err,
        DeviceError::Mac(MacError::StaleFrameCounter {
            received: 0,
            last: 0
        })
    ));

    // A new session starts over at counter 0
    let network = MockNetwork::new(&otaa_config());
    let keys = join(&mut device, &network, 2, false);
    assert_eq!(device.fcnt_down(), None);
    let first = data_downlink(&keys, DEV_ADDR, &DownlinkSpec::new(0, Some(1), b"again"));
    assert_eq!(data(device.process_downlink(&first).unwrap()).fcnt, 0);
}

#[test]
fn test_skip_fcnt_check_accepts_repeated_counters() {
    let store = MemoryStore::new();
    let config = otaa_config().with_skip_fcnt_check(true);
    let network = MockNetwork::new(&config);
    let mut device = Device::new(config, store.clone(), EU868::new()).unwrap();
    let keys = join(&mut device, &network, 1, false);

    let frame = data_downlink(&keys, DEV_ADDR, &DownlinkSpec::new(0, Some(2), b"again"));
    for _ in 0..2 {
        let downlink = data(device.process_downlink(&frame).unwrap());
        assert_eq!(&downlink.payload[..], b"again");
    }
    assert_eq!(store.get(&DEV_EUI).unwrap().unwrap().fcnt_down, Some(0));
}

#[test]
fn test_downlink_counter_rollover() {
    let (mut device, store, keys) = joined_device();
    store
        .set(&DEV_EUI, &[CounterField::FCntDown(Some(0xFFF0))])
        .unwrap();

    let frame = data_downlink(&keys, DEV_ADDR, &DownlinkSpec::new(0x1_0002, Some(1), b"r"));
    let downlink = data(device.process_downlink(&frame).unwrap());
    assert_eq!(downlink.fcnt, 0x1_0002);
    assert_eq!(store.get(&DEV_EUI).unwrap().unwrap().fcnt_down, Some(0x1_0002));
}

#[test]
fn test_store_unavailable_is_transient() {
    let (mut device, store, keys) = joined_device();

    store.set_available(false);
    let err = device
        .build_uplink(&Uplink::new(Some(1), b"x", tx()))
        .unwrap_err();
    assert!(err.is_transient());
    assert!(!err.is_security_rejection());
    assert_eq!(device.fcnt_up(), 0);

    let frame = data_downlink(&keys, DEV_ADDR, &DownlinkSpec::new(1, Some(1), b"x"));
    assert!(device.process_downlink(&frame).unwrap_err().is_transient());
    assert_eq!(device.fcnt_down(), None);

    assert!(Device::new(otaa_config(), store.clone(), EU868::new()).is_err());

    store.set_available(true);
    assert_eq!(
        device
            .build_uplink(&Uplink::new(Some(1), b"x", tx()))
            .unwrap()
            .fcnt,
        1
    );
    assert_eq!(data(device.process_downlink(&frame).unwrap()).fcnt, 1);
}

#[test]
fn test_join_request_during_store_outage() {
    let store = MemoryStore::new();
    let network = MockNetwork::new(&otaa_config());
    let mut device = Device::new(otaa_config(), store.clone(), EU868::new()).unwrap();
    let mut transport = RecordingTransport::new();

    store.set_available(false);
    let err = device.join(&mut transport, &tx()).unwrap_err();
    assert!(err.is_transient());
    assert!(transport.sent.is_empty());
    assert_eq!(device.join_state(), JoinState::NotJoined);
    assert_eq!(device.dev_nonce(), 0);

    store.set_available(true);
    let frame = device.build_join_request().unwrap();
    assert_eq!(network.receive_join_request(&frame), 1);

    // An outage while awaiting the accept keeps the pending request
    store.set_available(false);
    assert!(device.build_join_request().unwrap_err().is_transient());
    assert_eq!(device.join_state(), JoinState::AwaitingAccept { dev_nonce: 1 });
    store.set_available(true);
    assert_eq!(store.get(&DEV_EUI).unwrap().unwrap().dev_nonce, 1);
}

#[test]
fn test_join_accept_retried_after_store_outage() {
    let store = FlakyStore::new();
    let config = otaa_config();
    let network = MockNetwork::new(&config);
    let mut device = Device::new(config, store.clone(), EU868::new()).unwrap();

    let frame = device.build_join_request().unwrap();
    let dev_nonce = network.receive_join_request(&frame);
    let accept = network.join_accept(dev_nonce, 1, false, None);

    store.fail_next_sets(1);
    let err = device.process_downlink(&accept).unwrap_err();
    assert!(err.is_transient());
    assert!(!err.is_security_rejection());
    assert_eq!(device.join_state(), JoinState::AwaitingAccept { dev_nonce: 1 });
    assert!(device.session_keys().is_none());
    assert_eq!(store.get(&DEV_EUI).unwrap().unwrap().join_nonce, None);

    device.process_downlink(&accept).unwrap();
    assert!(device.is_joined());
    assert_eq!(device.session_keys(), Some(&network.session_keys(dev_nonce, 1, false)));
    assert_eq!(store.get(&DEV_EUI).unwrap().unwrap().join_nonce, Some(1));
}

#[test]
fn test_join_accept_during_store_outage() {
    let store = MemoryStore::new();
    let config = otaa_config();
    let network = MockNetwork::new(&config);
    let mut device = Device::new(config, store.clone(), EU868::new()).unwrap();

    let frame = device.build_join_request().unwrap();
    let dev_nonce = network.receive_join_request(&frame);
    let accept = network.join_accept(dev_nonce, 1, false, None);

    store.set_available(false);
    assert!(device.process_downlink(&accept).unwrap_err().is_transient());
    assert_eq!(device.join_state(), JoinState::AwaitingAccept { dev_nonce: 1 });

    store.set_available(true);
    device.process_downlink(&accept).unwrap();
    assert!(device.is_joined());
}

#[test]
fn test_reset_restarts_nonces() {
    let (mut device, store, _) = joined_device();
    let mut transport = RecordingTransport::new();
    device
        .send_uplink(&mut transport, &Uplink::new(Some(1), b"x", tx()))
        .unwrap();

    device.reset().unwrap();
    assert!(store.is_empty());
    assert_eq!(device.join_state(), JoinState::NotJoined);
    assert!(device.session_keys().is_none());
    assert_eq!((device.fcnt_up(), device.dev_nonce()), (0, 0));

    device.join(&mut transport, &tx()).unwrap();
    let network = MockNetwork::new(&otaa_config());
    assert_eq!(network.receive_join_request(transport.last().unwrap()), 1);
}

#[test]
fn test_confirmed_downlink_is_acknowledged_once() {
    let (mut device, _, keys) = joined_device();
    let mut transport = RecordingTransport::new();

    let mut spec = DownlinkSpec::new(1, Some(1), b"ack me");
    spec.confirmed = true;
    let downlink = data(device.process_downlink(&data_downlink(&keys, DEV_ADDR, &spec)).unwrap());
    assert!(downlink.confirmed);

    device
        .send_uplink(&mut transport, &Uplink::new(Some(1), b"a", tx()))
        .unwrap();
    let (frame, _) = open_uplink_v1_0(&keys, transport.last().unwrap());
    assert!(frame.fhdr.f_ctrl.ack);

    device
        .send_uplink(&mut transport, &Uplink::new(Some(1), b"b", tx()))
        .unwrap();
    let (frame, _) = open_uplink_v1_0(&keys, transport.last().unwrap());
    assert!(!frame.fhdr.f_ctrl.ack);
}

#[test]
fn test_confirmed_uplink_acknowledged_by_network() {
    let (mut device, _, keys) = joined_device();
    let mut transport = RecordingTransport::new();

    device
        .send_uplink(&mut transport, &Uplink::new(Some(1), b"c", tx()).confirmed())
        .unwrap();
    let (frame, _) = DataFrame::parse(transport.last().unwrap()).unwrap();
    assert!(frame.mtype.is_confirmed());
    assert_eq!(device.session().confirmed_uplink, Some(1));

    let mut spec = DownlinkSpec::new(1, None, &[]);
    spec.ack = true;
    let downlink = data(device.process_downlink(&data_downlink(&keys, DEV_ADDR, &spec)).unwrap());
    assert!(downlink.ack());
    assert_eq!(downlink.f_port, None);
    assert_eq!(device.session().confirmed_uplink, None);
}

#[test]
fn test_downlink_mac_commands() {
    let (mut device, _, keys) = joined_device();
    let link_check = MacCommand::LinkCheckAns {
        margin: 12,
        gateway_count: 3,
    };

    let mut spec = DownlinkSpec::new(1, Some(5), b"app");
    let commands = [link_check];
    spec.commands = &commands;
    let downlink = data(device.process_downlink(&data_downlink(&keys, DEV_ADDR, &spec)).unwrap());
    assert_eq!(&downlink.mac_commands[..], &[link_check]);
    assert_eq!(&downlink.payload[..], b"app");

    let port_zero = encode_commands(&[MacCommand::DevStatusReq, link_check]).unwrap();
    let spec = DownlinkSpec::new(2, Some(0), &port_zero);
    let downlink = data(device.process_downlink(&data_downlink(&keys, DEV_ADDR, &spec)).unwrap());
    assert_eq!(
        &downlink.mac_commands[..],
        &[MacCommand::DevStatusReq, link_check]
    );
    assert!(downlink.payload.is_empty());
}

#[test]
fn test_uplink_mac_commands_in_fopts() {
    let (mut device, _, keys) = joined_device();
    let mut transport = RecordingTransport::new();
    let answers = [MacCommand::DevStatusAns {
        battery: 200,
        margin: 7,
    }];

    device
        .send_uplink(
            &mut transport,
            &Uplink::new(Some(1), b"x", tx()).with_mac_commands(&answers),
        )
        .unwrap();
    let (frame, _) = open_uplink_v1_0(&keys, transport.last().unwrap());
    assert_eq!(&frame.fhdr.f_opts[..], &[0x06, 200, 7]);
    assert_eq!(frame.fhdr.f_ctrl.f_opts_len, 3);
}

#[test]
fn test_abp_device() {
    let keys = SessionKeys::new_v1_0(AESKey::new([0x11; 16]), AESKey::new([0x22; 16]));
    let config = DeviceConfig::new_abp(DEV_EUI, DEV_ADDR, keys.clone());
    let store = MemoryStore::new();
    let mut device = Device::new(config, store.clone(), EU868::new()).unwrap();
    let mut transport = RecordingTransport::new();

    assert!(device.is_joined());
    assert!(matches!(
        device.build_join_request().unwrap_err(),
        DeviceError::InvalidConfig(_)
    ));

    device
        .send_uplink(&mut transport, &Uplink::new(Some(2), b"abp", tx()))
        .unwrap();
    let (frame, payload) = open_uplink_v1_0(&keys, transport.last().unwrap());
    assert_eq!(frame.fhdr.dev_addr, DEV_ADDR);
    assert_eq!(payload, b"abp");

    let downlink = data_downlink(&keys, DEV_ADDR, &DownlinkSpec::new(1, Some(2), b"ok"));
    assert_eq!(&data(device.process_downlink(&downlink).unwrap()).payload[..], b"ok");

    device.reset().unwrap();
    assert!(device.is_joined());
    assert_eq!(device.session_keys(), Some(&keys));
    assert_eq!(device.fcnt_up(), 0);
}

#[test]
fn test_file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counters.json");
    let config = otaa_config();
    let network = MockNetwork::new(&config);

    {
        let mut device =
            Device::new(config.clone(), FileStore::new(path.clone()), EU868::new()).unwrap();
        join(&mut device, &network, 1, false);
        let mut transport = RecordingTransport::new();
        for _ in 0..3 {
            device
                .send_uplink(&mut transport, &Uplink::new(Some(1), b"x", tx()))
                .unwrap();
        }
    }

    let mut device = Device::new(config, FileStore::new(path.clone()), EU868::new()).unwrap();
    assert!(!device.is_joined());
    assert_eq!(device.fcnt_up(), 3);
    assert_eq!(device.dev_nonce(), 1);
    assert_eq!(device.session().join_nonce, Some(1));

    let frame = device.build_join_request().unwrap();
    assert_eq!(network.receive_join_request(&frame), 2);

    // A replayed accept from before the restart is still refused
    let replay = network.join_accept(2, 1, false, None);
    assert!(device.process_downlink(&replay).unwrap_err().is_security_rejection());
}

#[test]
fn test_abp_counters_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("abp.json");
    let keys = SessionKeys::new_v1_0(AESKey::new([0x11; 16]), AESKey::new([0x22; 16]));
    let config = DeviceConfig::new_abp(DEV_EUI, DEV_ADDR, keys);
    let mut transport = RecordingTransport::new();

    {
        let mut device =
            Device::new(config.clone(), FileStore::new(path.clone()), EU868::new()).unwrap();
        for _ in 0..2 {
            device
                .send_uplink(&mut transport, &Uplink::new(Some(1), b"x", tx()))
                .unwrap();
        }
    }

    let mut device = Device::new(config, FileStore::new(path), EU868::new()).unwrap();
    let fcnt = device
        .send_uplink(&mut transport, &Uplink::new(Some(1), b"x", tx()))
        .unwrap();
    assert_eq!(fcnt, 3);
}

#[test]
fn test_v1_1_join_and_uplink() {
    let store = MemoryStore::new();
    let config = otaa_config_v1_1();
    let network = MockNetwork::new(&config);
    let mut device = Device::new(config, store.clone(), EU868::new()).unwrap();

    let keys = join(&mut device, &network, 1, true);
    assert_eq!(device.session().mac_version, MacVersion::V1_1);
    assert_eq!(device.session_keys(), Some(&keys));
    assert_ne!(keys.f_nwk_s_int_key, keys.s_nwk_s_int_key);

    let built = device
        .build_uplink(&Uplink::new(Some(1), &[0x01, 0x02], tx()))
        .unwrap();
    let body = &built.bytes[..built.bytes.len() - 4];
    let expected = crypto::compute_uplink_mic_v1_1(
        &DefaultCrypto,
        &keys.f_nwk_s_int_key,
        &keys.s_nwk_s_int_key,
        DEV_ADDR,
        1,
        0,
        5,
        0,
        body,
    )
    .unwrap();
    assert_eq!(&built.bytes[built.bytes.len() - 4..], &expected);
}

#[test]
fn test_v1_1_downlink_with_encrypted_fopts() {
    let config = otaa_config_v1_1();
    let network = MockNetwork::new(&config);
    let mut device = Device::new(config, MemoryStore::new(), EU868::new()).unwrap();
    let keys = join(&mut device, &network, 1, true);
    let mut transport = RecordingTransport::new();

    device
        .send_uplink(&mut transport, &Uplink::new(Some(1), b"c", tx()).confirmed())
        .unwrap();

    let commands = [MacCommand::LinkCheckAns {
        margin: 9,
        gateway_count: 1,
    }];
    let mut spec = DownlinkSpec::new(1, Some(3), b"v11");
    spec.v1_1 = true;
    spec.ack = true;
    spec.conf_fcnt = 1;
    spec.commands = &commands;
    let downlink = data(device.process_downlink(&data_downlink(&keys, DEV_ADDR, &spec)).unwrap());

    assert_eq!(&downlink.mac_commands[..], &commands);
    assert_eq!(&downlink.payload[..], b"v11");
    assert!(downlink.ack());
}

#[test]
fn test_v1_0_device_ignores_opt_neg_network() {
    let config = otaa_config();
    let network = MockNetwork::new(&config);
    let mut device = Device::new(config, MemoryStore::new(), EU868::new()).unwrap();

    // A 1.1 answer signed with JSIntKey does not verify as a 1.0 join-accept
    let frame = device.build_join_request().unwrap();
    let dev_nonce = network.receive_join_request(&frame);
    let err = device
        .process_downlink(&network.join_accept(dev_nonce, 1, true, None))
        .unwrap_err();
    assert!(matches!(err, DeviceError::Mac(MacError::InvalidMic)));
    assert_eq!(device.join_state(), JoinState::NotJoined);
}
