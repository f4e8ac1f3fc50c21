use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{BeaconId, Error, Reading, Result};
use super::message::{
    AlarmParameter, BeaconObservation, DownlinkCommand, GatewayConfig, LoraConfig, MessageType,
    RequestCommand, UplinkFrame, UPLINK_ACK, UPLINK_BEACON_REPORT, UPLINK_SINGLE_REPORT,
};
use super::rssi::{decode_signed, encode_signed};

/// Length of one beacon entry in an uplink report
pub const OBSERVATION_LEN: usize = 5;

const LORA_CONFIG_LEN: usize = 3;
const GATEWAY_CONFIG_LEN: usize = 4;
const SINGLE_REPORT_LEN: usize = 7;
const ACK_LEN: usize = 2;

const FLAG_BIT: u8 = 0x08;
const MAX_DATA_RATE: u8 = 3;
const MAX_BAND_MODE: u8 = 7;
const MAX_POWER: u8 = 20;
const MAX_VOLUME: u8 = 4;

/// Encodes a downlink command into its wire representation
pub fn encode_downlink(command: &DownlinkCommand) -> Result<Bytes> {
    let mut dst = BytesMut::with_capacity(6);
    match command {
        DownlinkCommand::LoraConfig(c) => {
            if c.data_rate > MAX_DATA_RATE {
                return Err(Error::unsupported(format!("data rate {} exceeds {}", c.data_rate, MAX_DATA_RATE)));
            }
            if c.band_mode > MAX_BAND_MODE {
                return Err(Error::unsupported(format!("band mode {} exceeds {}", c.band_mode, MAX_BAND_MODE)));
            }
            if c.power > MAX_POWER {
                return Err(Error::unsupported(format!("power {} exceeds {}", c.power, MAX_POWER)));
            }
            dst.put_u8(header(MessageType::LoraConfig, if c.adr { FLAG_BIT } else { 0 }));
            dst.put_u8(c.data_rate << 4);
            dst.put_u8((c.band_mode << 5) | c.power);
        }
        DownlinkCommand::GatewayConfig(c) => {
            dst.put_u8(header(MessageType::GatewayConfig, if c.switch_enabled { FLAG_BIT } else { 0 }));
            dst.put_u16(c.position_interval);
            dst.put_u8(c.heartbeat_period);
        }
        DownlinkCommand::CommandRequest { seq, command } => {
            dst.put_u8(header(MessageType::CommandRequest, command.code()));
            dst.put_u8(*seq);
            match command {
                RequestCommand::AdjustStartOffset(offset) => {
                    dst.put_u8(encode_signed(*offset, "start-time offset")?);
                }
                RequestCommand::AdjustDuration(secs) => dst.put_u16(*secs),
                RequestCommand::SetMaxBeaconQuantity(raw) => dst.put_u8(*raw),
                RequestCommand::SetAssetRssiThreshold(rssi) => {
                    dst.put_u8(encode_signed(*rssi, "asset RSSI threshold")?);
                }
                RequestCommand::BeaconSearch(beacon) => dst.put_u16(beacon.minor()),
                RequestCommand::Register
                | RequestCommand::Reboot
                | RequestCommand::StopContinuousReceive
                | RequestCommand::StartContinuousReceive
                | RequestCommand::RequestPosition
                | RequestCommand::RequestHeartbeat => {}
            }
        }
        DownlinkCommand::AlarmConfig { seq, parameter } => {
            dst.put_u8(header(MessageType::AlarmConfig, 0));
            dst.put_u8(*seq);
            dst.put_u8(parameter.selector());
            match parameter {
                AlarmParameter::RssiThreshold(rssi) => {
                    dst.put_u8(encode_signed(*rssi, "alarm RSSI threshold")?);
                }
                AlarmParameter::BuzzerVolume(volume) => {
                    if *volume > MAX_VOLUME {
                        return Err(Error::unsupported(format!("buzzer volume {} exceeds {}", volume, MAX_VOLUME)));
                    }
                    dst.put_u8(*volume);
                }
                AlarmParameter::BuzzerDuration(units)
                | AlarmParameter::BeaconQuantity(units)
                | AlarmParameter::ReceivingDelay(units) => dst.put_u8(*units),
                AlarmParameter::ReportInterval(units) => dst.put_u16(*units),
                AlarmParameter::SilentButton(enabled) => dst.put_u8(u8::from(*enabled)),
            }
        }
    }
    Ok(dst.freeze())
}

/// Decodes a complete downlink payload
pub fn decode_downlink(payload: &[u8]) -> Result<DownlinkCommand> {
    let len = downlink_len(payload)?
        .ok_or_else(|| Error::malformed(format!("downlink truncated at {} bytes", payload.len())))?;
    if payload.len() != len {
        return Err(Error::malformed(format!(
            "downlink has {} bytes, expected {}",
            payload.len(),
            len
        )));
    }

    let mut buf = payload;
    let first = buf.get_u8();
    let low = first & 0x0F;
    let message_type = MessageType::from_nibble(first >> 4)
        .ok_or_else(|| Error::malformed(format!("unknown downlink type 0x{:X}", first >> 4)))?;

    let command = match message_type {
        MessageType::LoraConfig => {
            require_flag_only(low, "LoRa config")?;
            let rate = buf.get_u8();
            if rate & 0x0F != 0 {
                return Err(Error::malformed("LoRa config byte 2 has reserved bits set"));
            }
            let radio = buf.get_u8();
            let config = LoraConfig {
                adr: low & FLAG_BIT != 0,
                data_rate: rate >> 4,
                band_mode: radio >> 5,
                power: radio & 0x1F,
            };
            if config.data_rate > MAX_DATA_RATE || config.power > MAX_POWER {
                return Err(Error::malformed("LoRa config field out of range"));
            }
            DownlinkCommand::LoraConfig(config)
        }
        MessageType::GatewayConfig => {
            require_flag_only(low, "gateway config")?;
            DownlinkCommand::GatewayConfig(GatewayConfig {
                switch_enabled: low & FLAG_BIT != 0,
                position_interval: buf.get_u16(),
                heartbeat_period: buf.get_u8(),
            })
        }
        MessageType::CommandRequest => {
            let seq = buf.get_u8();
            let command = match low {
                0x1 => RequestCommand::Register,
                0x2 => RequestCommand::Reboot,
                0x3 => RequestCommand::StopContinuousReceive,
                0x4 => RequestCommand::StartContinuousReceive,
                0x5 => RequestCommand::AdjustStartOffset(decode_signed(buf.get_u8())),
                0x6 => RequestCommand::AdjustDuration(buf.get_u16()),
                0x7 => RequestCommand::SetMaxBeaconQuantity(buf.get_u8()),
                0x8 => RequestCommand::RequestPosition,
                0x9 => RequestCommand::RequestHeartbeat,
                0xB => RequestCommand::SetAssetRssiThreshold(decode_signed(buf.get_u8())),
                0xC => RequestCommand::BeaconSearch(BeaconId::new(buf.get_u16())),
                other => return Err(Error::malformed(format!("unknown sub-command 0x{:X}", other))),
            };
            DownlinkCommand::CommandRequest { seq, command }
        }
        MessageType::AlarmConfig => {
            if low != 0 {
                return Err(Error::malformed("alarm config reserved nibble set"));
            }
            let seq = buf.get_u8();
            let selector = buf.get_u8();
            let parameter = match selector {
                0x00 => AlarmParameter::RssiThreshold(decode_signed(buf.get_u8())),
                0x01 => {
                    let volume = buf.get_u8();
                    if volume > MAX_VOLUME {
                        return Err(Error::malformed(format!("buzzer volume {} out of range", volume)));
                    }
                    AlarmParameter::BuzzerVolume(volume)
                }
                0x02 => AlarmParameter::BuzzerDuration(buf.get_u8()),
                0x03 => AlarmParameter::BeaconQuantity(buf.get_u8()),
                0x04 => AlarmParameter::ReceivingDelay(buf.get_u8()),
                0x05 => AlarmParameter::ReportInterval(buf.get_u16()),
                0x06 => match buf.get_u8() {
                    0 => AlarmParameter::SilentButton(false),
                    1 => AlarmParameter::SilentButton(true),
                    v => return Err(Error::malformed(format!("silent button value {} out of range", v))),
                },
                other => return Err(Error::malformed(format!("unknown alarm parameter 0x{:02X}", other))),
            };
            DownlinkCommand::AlarmConfig { seq, parameter }
        }
    };
    Ok(command)
}

/// Decodes one `[major, minor, rssi]` report entry
pub fn decode_observation(fragment: &[u8]) -> Result<BeaconObservation> {
    if fragment.len() < OBSERVATION_LEN {
        return Err(Error::malformed(format!(
            "beacon entry has {} bytes, expected {}",
            fragment.len(),
            OBSERVATION_LEN
        )));
    }
    let mut buf = fragment;
    Ok(BeaconObservation {
        major: buf.get_u16(),
        beacon: BeaconId::new(buf.get_u16()),
        rssi: decode_signed(buf.get_u8()),
    })
}

/// Decodes a single beacon reading fragment
pub fn decode_reading(fragment: &[u8]) -> Result<Reading> {
    decode_observation(fragment).map(Reading::from)
}

/// Decodes a complete uplink payload
pub fn decode_uplink(payload: &[u8]) -> Result<UplinkFrame> {
    let len = uplink_len(payload)?
        .ok_or_else(|| Error::malformed(format!("uplink truncated at {} bytes", payload.len())))?;
    let frame = &payload[..len];

    match frame[0] >> 4 {
        UPLINK_BEACON_REPORT => frame[1..]
            .chunks(OBSERVATION_LEN)
            .map(decode_observation)
            .collect::<Result<Vec<_>>>()
            .map(UplinkFrame::BeaconReport),
        UPLINK_SINGLE_REPORT => {
            let mut buf = &frame[2..];
            Ok(UplinkFrame::SingleReport(BeaconObservation {
                major: buf.get_u16(),
                beacon: BeaconId::new(buf.get_u16()),
                rssi: decode_signed(buf.get_u8()),
            }))
        }
        _ => Ok(UplinkFrame::Acknowledgment { seq: frame[1] }),
    }
}

/// Encodes an uplink frame, as a field device would
pub fn encode_uplink(frame: &UplinkFrame) -> Result<Bytes> {
    let mut dst = BytesMut::new();
    match frame {
        UplinkFrame::BeaconReport(entries) => {
            if entries.is_empty() || entries.len() > 0x0F {
                return Err(Error::unsupported(format!(
                    "beacon report carries 1-15 entries, got {}",
                    entries.len()
                )));
            }
            dst.put_u8((UPLINK_BEACON_REPORT << 4) | entries.len() as u8);
            for entry in entries {
                put_observation(&mut dst, entry)?;
            }
        }
        UplinkFrame::SingleReport(entry) => {
            dst.put_u8(UPLINK_SINGLE_REPORT << 4);
            dst.put_u8(0);
            put_observation(&mut dst, entry)?;
        }
        UplinkFrame::Acknowledgment { seq } => {
            dst.put_u8(UPLINK_ACK << 4);
            dst.put_u8(*seq);
        }
    }
    Ok(dst.freeze())
}

fn put_observation(dst: &mut BytesMut, entry: &BeaconObservation) -> Result<()> {
    dst.put_u16(entry.major);
    dst.put_u16(entry.beacon.minor());
    dst.put_u8(encode_signed(entry.rssi, "reading RSSI")?);
    Ok(())
}

fn header(message_type: MessageType, low: u8) -> u8 {
    (message_type.nibble() << 4) | (low & 0x0F)
}

fn require_flag_only(low: u8, what: &str) -> Result<()> {
    if low & !FLAG_BIT != 0 {
        return Err(Error::malformed(format!("{} byte 1 has reserved bits set", what)));
    }
    Ok(())
}

/// Full length of the downlink starting at `src[0]`, or `None` if more bytes are needed
fn downlink_len(src: &[u8]) -> Result<Option<usize>> {
    let Some(&first) = src.first() else {
        return Ok(None);
    };
    let len = match MessageType::from_nibble(first >> 4) {
        Some(MessageType::LoraConfig) => LORA_CONFIG_LEN,
        Some(MessageType::GatewayConfig) => GATEWAY_CONFIG_LEN,
        Some(MessageType::CommandRequest) => {
            let code = first & 0x0F;
            let arg = RequestCommand::argument_len(code)
                .ok_or_else(|| Error::malformed(format!("unknown sub-command 0x{:X}", code)))?;
            2 + arg
        }
        Some(MessageType::AlarmConfig) => {
            if src.len() < 3 {
                return Ok(None);
            }
            let value = AlarmParameter::value_len(src[2])
                .ok_or_else(|| Error::malformed(format!("unknown alarm parameter 0x{:02X}", src[2])))?;
            3 + value
        }
        None => return Err(Error::malformed(format!("unknown downlink type 0x{:X}", first >> 4))),
    };
    Ok(if src.len() >= len { Some(len) } else { None })
}

/// Full length of the uplink starting at `src[0]`, or `None` if more bytes are needed
fn uplink_len(src: &[u8]) -> Result<Option<usize>> {
    let Some(&first) = src.first() else {
        return Ok(None);
    };
    let len = match first >> 4 {
        UPLINK_BEACON_REPORT => {
            let count = usize::from(first & 0x0F);
            if count == 0 {
                return Err(Error::malformed("beacon report with no entries"));
            }
            1 + count * OBSERVATION_LEN
        }
        UPLINK_SINGLE_REPORT => SINGLE_REPORT_LEN,
        UPLINK_ACK => ACK_LEN,
        other => return Err(Error::malformed(format!("unknown uplink type 0x{:X}", other))),
    };
    Ok(if src.len() >= len { Some(len) } else { None })
}

/// Stream codec: encodes downlink commands and decodes uplink frames
#[derive(Clone, Default)]
pub struct LoraCodec;

impl LoraCodec {
    /// Creates a new codec
    pub fn new() -> Self {
        LoraCodec
    }
}

impl Decoder for LoraCodec {
    type Item = UplinkFrame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let len = match uplink_len(src) {
            Ok(Some(len)) => len,
            Ok(None) => return Ok(None),
            Err(e) => {
                // Skip the bad header byte; the next call resyncs on what follows
                src.advance(1);
                return Err(e);
            }
        };
        let frame = src.split_to(len);
        decode_uplink(&frame).map(Some)
    }
}

impl Encoder<DownlinkCommand> for LoraCodec {
    type Error = Error;

    fn encode(&mut self, item: DownlinkCommand, dst: &mut BytesMut) -> Result<()> {
        let bytes = encode_downlink(&item)?;
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn every_command() -> Vec<DownlinkCommand> {
        let mut commands = vec![
            DownlinkCommand::LoraConfig(LoraConfig { adr: true, data_rate: 3, band_mode: 7, power: 20 }),
            DownlinkCommand::LoraConfig(LoraConfig { adr: false, data_rate: 0, band_mode: 0, power: 0 }),
            DownlinkCommand::GatewayConfig(GatewayConfig {
                switch_enabled: true,
                position_interval: 0x1234,
                heartbeat_period: 10,
            }),
            DownlinkCommand::GatewayConfig(GatewayConfig {
                switch_enabled: false,
                position_interval: u16::MAX,
                heartbeat_period: 0,
            }),
        ];
        let requests = [
            RequestCommand::Register,
            RequestCommand::Reboot,
            RequestCommand::StopContinuousReceive,
            RequestCommand::StartContinuousReceive,
            RequestCommand::AdjustStartOffset(-5),
            RequestCommand::AdjustStartOffset(127),
            RequestCommand::AdjustDuration(3600),
            RequestCommand::SetMaxBeaconQuantity(0xFE),
            RequestCommand::RequestPosition,
            RequestCommand::RequestHeartbeat,
            RequestCommand::SetAssetRssiThreshold(-128),
            RequestCommand::BeaconSearch(BeaconId(0x64B0)),
        ];
        for (i, command) in requests.into_iter().enumerate() {
            commands.push(DownlinkCommand::CommandRequest { seq: i as u8 * 20, command });
        }
        let parameters = [
            AlarmParameter::RssiThreshold(-70),
            AlarmParameter::RssiThreshold(10),
            AlarmParameter::BuzzerVolume(4),
            AlarmParameter::BuzzerDuration(0),
            AlarmParameter::BeaconQuantity(3),
            AlarmParameter::ReceivingDelay(15),
            AlarmParameter::ReportInterval(720),
            AlarmParameter::SilentButton(true),
            AlarmParameter::SilentButton(false),
        ];
        for (i, parameter) in parameters.into_iter().enumerate() {
            commands.push(DownlinkCommand::AlarmConfig { seq: 255 - i as u8, parameter });
        }
        commands
    }

    #[test]
    fn test_round_trip_every_command() {
        for command in every_command() {
            let bytes = encode_downlink(&command).unwrap();
            let decoded = decode_downlink(&bytes).unwrap();
            assert_eq!(decoded, command, "bytes {:02X?}", &bytes[..]);
            assert_eq!(encode_downlink(&decoded).unwrap(), bytes);
        }
    }

    #[test]
    fn test_alarm_rssi_threshold_layout() {
        let command = DownlinkCommand::AlarmConfig {
            seq: 0x17,
            parameter: AlarmParameter::RssiThreshold(-70),
        };
        let bytes = encode_downlink(&command).unwrap();
        assert_eq!(&bytes[..], &[0xB0, 0x17, 0x00, 0xBA]);
    }

    #[test]
    fn test_known_device_commands() {
        // Volume 4, duration 60 s, mute and beacon search as sent to the macro sensor
        let volume = DownlinkCommand::alarm(AlarmParameter::BuzzerVolume(4));
        assert_eq!(&encode_downlink(&volume).unwrap()[..], &[0xB0, 0x00, 0x01, 0x04]);

        let duration = DownlinkCommand::alarm(AlarmParameter::BuzzerDuration(6));
        assert_eq!(&encode_downlink(&duration).unwrap()[..], &[0xB0, 0x00, 0x02, 0x06]);

        let mute = DownlinkCommand::alarm(AlarmParameter::BuzzerVolume(0));
        assert_eq!(&encode_downlink(&mute).unwrap()[..], &[0xB0, 0x00, 0x01, 0x00]);

        let search = DownlinkCommand::CommandRequest {
            seq: 0x05,
            command: RequestCommand::BeaconSearch(BeaconId(0x64B0)),
        };
        assert_eq!(&encode_downlink(&search).unwrap()[..], &[0xAC, 0x05, 0x64, 0xB0]);
    }

    #[test]
    fn test_lora_and_gateway_bitfields() {
        let lora = DownlinkCommand::LoraConfig(LoraConfig { adr: true, data_rate: 2, band_mode: 3, power: 17 });
        assert_eq!(&encode_downlink(&lora).unwrap()[..], &[0x88, 0x20, 0x71]);

        let gateway = DownlinkCommand::GatewayConfig(GatewayConfig {
            switch_enabled: true,
            position_interval: 0x0102,
            heartbeat_period: 0x0A,
        });
        assert_eq!(&encode_downlink(&gateway).unwrap()[..], &[0x98, 0x01, 0x02, 0x0A]);
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let cases = [
            DownlinkCommand::LoraConfig(LoraConfig { adr: false, data_rate: 0, band_mode: 0, power: 21 }),
            DownlinkCommand::LoraConfig(LoraConfig { adr: false, data_rate: 4, band_mode: 0, power: 0 }),
            DownlinkCommand::LoraConfig(LoraConfig { adr: false, data_rate: 0, band_mode: 8, power: 0 }),
            DownlinkCommand::alarm(AlarmParameter::BuzzerVolume(5)),
            DownlinkCommand::alarm(AlarmParameter::RssiThreshold(-129)),
            DownlinkCommand::request(RequestCommand::SetAssetRssiThreshold(200)),
        ];
        for command in cases {
            assert!(
                matches!(encode_downlink(&command), Err(Error::UnsupportedParameter(_))),
                "{} should be rejected",
                command
            );
        }
    }

    #[test]
    fn test_malformed_downlinks() {
        assert!(matches!(decode_downlink(&[]), Err(Error::MalformedPayload(_))));
        // Truncated alarm config
        assert!(matches!(decode_downlink(&[0xB0, 0x01, 0x00]), Err(Error::MalformedPayload(_))));
        // Trailing byte
        assert!(decode_downlink(&[0xB0, 0x01, 0x01, 0x04, 0x00]).is_err());
        // Unknown type, sub-command and selector
        assert!(decode_downlink(&[0x40, 0x00, 0x00]).is_err());
        assert!(decode_downlink(&[0xAF, 0x00]).is_err());
        assert!(decode_downlink(&[0xB0, 0x00, 0x07, 0x00]).is_err());
        // Reserved bits set
        assert!(decode_downlink(&[0x81, 0x00, 0x00]).is_err());
    }

    #[test]
    fn test_decode_reading_offset_rssi() {
        let reading = decode_reading(&[0x00, 0x10, 0x64, 0xB0, 0xBA]).unwrap();
        assert_eq!(reading, Reading::new(BeaconId(0x64B0), -70));

        let reading = decode_reading(&[0x00, 0x10, 0x64, 0xAF, 0x2A]).unwrap();
        assert_eq!(reading.rssi, 42);

        assert!(matches!(
            decode_reading(&[0x00, 0x10, 0x64]),
            Err(Error::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_uplink_frames() {
        let report = [0x22, 0x00, 0x10, 0x64, 0xAF, 0xD6, 0x00, 0x10, 0x64, 0xB0, 0xA8];
        match decode_uplink(&report).unwrap() {
            UplinkFrame::BeaconReport(entries) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].beacon, BeaconId(0x64AF));
                assert_eq!(entries[0].rssi, -42);
                assert_eq!(entries[1].rssi, -88);
            }
            other => panic!("unexpected frame {:?}", other),
        }

        let single = [0x30, 0x00, 0x00, 0x10, 0x64, 0xB0, 0xBA];
        assert_eq!(
            decode_uplink(&single).unwrap().readings(),
            vec![Reading::new(BeaconId(0x64B0), -70)]
        );

        assert_eq!(decode_uplink(&[0xF0, 0x2A]).unwrap(), UplinkFrame::Acknowledgment { seq: 0x2A });

        // Declared two entries, carries one
        assert!(matches!(
            decode_uplink(&report[..6]),
            Err(Error::MalformedPayload(_))
        ));
        assert!(decode_uplink(&[0x30, 0x00, 0x00]).is_err());
        assert!(decode_uplink(&[0x20]).is_err());
        assert!(decode_uplink(&[0x70, 0x00]).is_err());
    }

    #[test]
    fn test_uplink_encode_matches_decode() {
        let frame = UplinkFrame::BeaconReport(vec![BeaconObservation {
            major: 0x0010,
            beacon: BeaconId(0x64B0),
            rssi: -90,
        }]);
        let bytes = encode_uplink(&frame).unwrap();
        assert_eq!(&bytes[..], &[0x21, 0x00, 0x10, 0x64, 0xB0, 0xA6]);
        assert_eq!(decode_uplink(&bytes).unwrap(), frame);
        assert!(encode_uplink(&UplinkFrame::BeaconReport(vec![])).is_err());
    }

    #[test]
    fn test_stream_codec_waits_for_complete_frames() {
        let mut codec = LoraCodec::new();
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&[0x21, 0x00, 0x10]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&[0x64, 0xB0, 0xA6, 0xF0, 0x03]);
        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.readings()[0].rssi, -90);
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second, UplinkFrame::Acknowledgment { seq: 3 });
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_stream_codec_resyncs_after_garbage() {
        let mut codec = LoraCodec::new();
        let mut buf = BytesMut::from(&[0x70, 0x20, 0xF0, 0x07][..]);

        assert!(matches!(codec.decode(&mut buf), Err(Error::MalformedPayload(_))));
        assert!(matches!(codec.decode(&mut buf), Err(Error::MalformedPayload(_))));
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame, UplinkFrame::Acknowledgment { seq: 7 });
        assert!(buf.is_empty());
    }

    #[test]
    fn test_stream_codec_encodes_downlinks() {
        let mut codec = LoraCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(DownlinkCommand::alarm(AlarmParameter::BuzzerVolume(4)), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], &[0xB0, 0x00, 0x01, 0x04]);
    }
}
