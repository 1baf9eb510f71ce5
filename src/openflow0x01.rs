use std::io::{self, Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::bits::{pack, test_bit};

/// OpenFlow 1.0 message type codes, used by headers to identify meaning of the rest of a message.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MsgCode {
    Hello,
    Error,
    EchoReq,
    EchoResp,
    Vendor,
    FeaturesReq,
    FeaturesResp,
    GetConfigReq,
    GetConfigResp,
    SetConfig,
    PacketIn,
    FlowRemoved,
    PortStatus,
    PacketOut,
    FlowMod,
    PortMod,
    StatsReq,
    StatsResp,
    BarrierReq,
    BarrierResp,
    QueueGetConfigReq,
    QueueGetConfigResp,
}

impl MsgCode {
    /// Map a raw header type byte to a `MsgCode`, or `None` if it is outside OpenFlow 1.0.
    pub fn from_u8(code: u8) -> Option<MsgCode> {
        use self::MsgCode::*;
        const CODES: [MsgCode; 22] = [Hello,
                                      Error,
                                      EchoReq,
                                      EchoResp,
                                      Vendor,
                                      FeaturesReq,
                                      FeaturesResp,
                                      GetConfigReq,
                                      GetConfigResp,
                                      SetConfig,
                                      PacketIn,
                                      FlowRemoved,
                                      PortStatus,
                                      PacketOut,
                                      FlowMod,
                                      PortMod,
                                      StatsReq,
                                      StatsResp,
                                      BarrierReq,
                                      BarrierResp,
                                      QueueGetConfigReq,
                                      QueueGetConfigResp];
        CODES.get(code as usize).copied()
    }
}

/// Common API for message types implementing OpenFlow Message Codes (see `MsgCode` enum).
pub trait MessageType: Sized {
    /// Parse a message body.
    fn parse(bytes: &mut Cursor<&[u8]>) -> io::Result<Self>;
    /// Marshal a message body into a `u8` buffer.
    fn marshal(&self, bytes: &mut Vec<u8>) -> io::Result<()>;
}

fn invalid(what: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, what)
}

fn remaining(bytes: &Cursor<&[u8]>) -> usize {
    bytes.get_ref().len().saturating_sub(bytes.position() as usize)
}

fn skip(bytes: &mut Cursor<&[u8]>, n: usize) -> io::Result<()> {
    let mut pad = [0; 8];
    bytes.read_exact(&mut pad[..n])
}

fn read_rest(bytes: &mut Cursor<&[u8]>) -> io::Result<Vec<u8>> {
    let mut rest = vec![];
    bytes.read_to_end(&mut rest)?;
    Ok(rest)
}

fn read_mac(bytes: &mut Cursor<&[u8]>) -> io::Result<[u8; 6]> {
    let mut mac = [0; 6];
    bytes.read_exact(&mut mac)?;
    Ok(mac)
}

const OFP_MATCH_LEN: usize = 40;
const OFP_PHY_PORT_LEN: usize = 48;
const OFP_ACTION_OUTPUT_LEN: u16 = 8;

const OFPFW_IN_PORT: u32 = 1 << 0;
const OFPFW_DL_VLAN: u32 = 1 << 1;
const OFPFW_DL_SRC: u32 = 1 << 2;
const OFPFW_DL_DST: u32 = 1 << 3;
const OFPFW_DL_TYPE: u32 = 1 << 4;
const OFPFW_NW_PROTO: u32 = 1 << 5;
const OFPFW_TP_SRC: u32 = 1 << 6;
const OFPFW_TP_DST: u32 = 1 << 7;
const OFPFW_NW_SRC_SHIFT: u32 = 8;
const OFPFW_NW_DST_SHIFT: u32 = 14;
const OFPFW_NW_ALL: u32 = 32;
const OFPFW_DL_VLAN_PCP: u32 = 1 << 20;
const OFPFW_NW_TOS: u32 = 1 << 21;

/// Fields to match against flows. `None` means the field is wildcarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pattern {
    pub in_port: Option<u16>,
    pub dl_src: Option<[u8; 6]>,
    pub dl_dst: Option<[u8; 6]>,
    pub dl_vlan: Option<u16>,
    pub dl_vlan_pcp: Option<u8>,
    pub dl_typ: Option<u16>,
    pub nw_tos: Option<u8>,
    pub nw_proto: Option<u8>,
    pub nw_src: Option<u32>,
    pub nw_dst: Option<u32>,
    pub tp_src: Option<u16>,
    pub tp_dst: Option<u16>,
}

fn exact<T>(wildcards: u32, flag: u32, value: T) -> Option<T> {
    if wildcards & flag == 0 { Some(value) } else { None }
}

fn exact_nw(wildcards: u32, shift: u32, value: u32) -> Option<u32> {
    if (wildcards >> shift) & 0x3f >= OFPFW_NW_ALL { None } else { Some(value) }
}

impl Pattern {
    /// A pattern wildcarding every field.
    pub fn match_all() -> Pattern {
        Pattern::default()
    }

    fn wildcards(&self) -> u32 {
        let mut w = 0;
        let flags = [(self.in_port.is_none(), OFPFW_IN_PORT),
                     (self.dl_vlan.is_none(), OFPFW_DL_VLAN),
                     (self.dl_src.is_none(), OFPFW_DL_SRC),
                     (self.dl_dst.is_none(), OFPFW_DL_DST),
                     (self.dl_typ.is_none(), OFPFW_DL_TYPE),
                     (self.nw_proto.is_none(), OFPFW_NW_PROTO),
                     (self.tp_src.is_none(), OFPFW_TP_SRC),
                     (self.tp_dst.is_none(), OFPFW_TP_DST),
                     (self.dl_vlan_pcp.is_none(), OFPFW_DL_VLAN_PCP),
                     (self.nw_tos.is_none(), OFPFW_NW_TOS)];
        for &(wild, flag) in flags.iter() {
            if wild {
                w |= flag;
            }
        }
        if self.nw_src.is_none() {
            w |= OFPFW_NW_ALL << OFPFW_NW_SRC_SHIFT;
        }
        if self.nw_dst.is_none() {
            w |= OFPFW_NW_ALL << OFPFW_NW_DST_SHIFT;
        }
        w
    }

    fn parse(bytes: &mut Cursor<&[u8]>) -> io::Result<Pattern> {
        let w = bytes.read_u32::<BigEndian>()?;
        let in_port = bytes.read_u16::<BigEndian>()?;
        let dl_src = read_mac(bytes)?;
        let dl_dst = read_mac(bytes)?;
        let dl_vlan = bytes.read_u16::<BigEndian>()?;
        let dl_vlan_pcp = bytes.read_u8()?;
        skip(bytes, 1)?;
        let dl_typ = bytes.read_u16::<BigEndian>()?;
        let nw_tos = bytes.read_u8()?;
        let nw_proto = bytes.read_u8()?;
        skip(bytes, 2)?;
        let nw_src = bytes.read_u32::<BigEndian>()?;
        let nw_dst = bytes.read_u32::<BigEndian>()?;
        let tp_src = bytes.read_u16::<BigEndian>()?;
        let tp_dst = bytes.read_u16::<BigEndian>()?;
        Ok(Pattern {
            in_port: exact(w, OFPFW_IN_PORT, in_port),
            dl_src: exact(w, OFPFW_DL_SRC, dl_src),
            dl_dst: exact(w, OFPFW_DL_DST, dl_dst),
            dl_vlan: exact(w, OFPFW_DL_VLAN, dl_vlan),
            dl_vlan_pcp: exact(w, OFPFW_DL_VLAN_PCP, dl_vlan_pcp),
            dl_typ: exact(w, OFPFW_DL_TYPE, dl_typ),
            nw_tos: exact(w, OFPFW_NW_TOS, nw_tos),
            nw_proto: exact(w, OFPFW_NW_PROTO, nw_proto),
            nw_src: exact_nw(w, OFPFW_NW_SRC_SHIFT, nw_src),
            nw_dst: exact_nw(w, OFPFW_NW_DST_SHIFT, nw_dst),
            tp_src: exact(w, OFPFW_TP_SRC, tp_src),
            tp_dst: exact(w, OFPFW_TP_DST, tp_dst),
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) -> io::Result<()> {
        bytes.write_u32::<BigEndian>(self.wildcards())?;
        bytes.write_u16::<BigEndian>(self.in_port.unwrap_or(0))?;
        bytes.write_all(&self.dl_src.unwrap_or([0; 6]))?;
        bytes.write_all(&self.dl_dst.unwrap_or([0; 6]))?;
        bytes.write_u16::<BigEndian>(self.dl_vlan.unwrap_or(0))?;
        bytes.write_u8(self.dl_vlan_pcp.unwrap_or(0))?;
        bytes.write_u8(0)?;
        bytes.write_u16::<BigEndian>(self.dl_typ.unwrap_or(0))?;
        bytes.write_u8(self.nw_tos.unwrap_or(0))?;
        bytes.write_u8(self.nw_proto.unwrap_or(0))?;
        bytes.write_u16::<BigEndian>(0)?;
        bytes.write_u32::<BigEndian>(self.nw_src.unwrap_or(0))?;
        bytes.write_u32::<BigEndian>(self.nw_dst.unwrap_or(0))?;
        bytes.write_u16::<BigEndian>(self.tp_src.unwrap_or(0))?;
        bytes.write_u16::<BigEndian>(self.tp_dst.unwrap_or(0))
    }
}

/// Port behavior.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PseudoPort {
    PhysicalPort(u16),
    InPort,
    Table,
    Normal,
    Flood,
    AllPorts,
    Controller(u64),
    Local,
}

#[repr(u16)]
enum OfpPort {
    OFPPMax = 0xff00,
    OFPPInPort = 0xfff8,
    OFPPTable = 0xfff9,
    OFPPNormal = 0xfffa,
    OFPPFlood = 0xfffb,
    OFPPAll = 0xfffc,
    OFPPController = 0xfffd,
    OFPPLocal = 0xfffe,
    OFPPNone = 0xffff,
}

impl PseudoPort {
    fn of_int(p: u16) -> io::Result<Option<PseudoPort>> {
        if (OfpPort::OFPPNone as u16) == p {
            Ok(None)
        } else {
            PseudoPort::make(p, 0).map(Some)
        }
    }

    fn make(p: u16, len: u64) -> io::Result<PseudoPort> {
        let port = match p {
            p if p == (OfpPort::OFPPInPort as u16) => PseudoPort::InPort,
            p if p == (OfpPort::OFPPTable as u16) => PseudoPort::Table,
            p if p == (OfpPort::OFPPNormal as u16) => PseudoPort::Normal,
            p if p == (OfpPort::OFPPFlood as u16) => PseudoPort::Flood,
            p if p == (OfpPort::OFPPAll as u16) => PseudoPort::AllPorts,
            p if p == (OfpPort::OFPPController as u16) => PseudoPort::Controller(len),
            p if p == (OfpPort::OFPPLocal as u16) => PseudoPort::Local,
            p if p <= (OfpPort::OFPPMax as u16) => PseudoPort::PhysicalPort(p),
            p => return Err(invalid(format!("unsupported port number {:#x}", p))),
        };
        Ok(port)
    }

    fn to_int(&self) -> u16 {
        match *self {
            PseudoPort::PhysicalPort(p) => p,
            PseudoPort::InPort => OfpPort::OFPPInPort as u16,
            PseudoPort::Table => OfpPort::OFPPTable as u16,
            PseudoPort::Normal => OfpPort::OFPPNormal as u16,
            PseudoPort::Flood => OfpPort::OFPPFlood as u16,
            PseudoPort::AllPorts => OfpPort::OFPPAll as u16,
            PseudoPort::Controller(_) => OfpPort::OFPPController as u16,
            PseudoPort::Local => OfpPort::OFPPLocal as u16,
        }
    }
}

fn marshal_port(port: Option<u16>, bytes: &mut Vec<u8>) -> io::Result<()> {
    bytes.write_u16::<BigEndian>(port.unwrap_or(OfpPort::OFPPNone as u16))
}

/// Actions associated with flows and packets.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    Output(PseudoPort),
}

#[repr(u16)]
enum OfpActionType {
    OFPATOutput,
}

impl Action {
    fn type_code(&self) -> OfpActionType {
        match *self {
            Action::Output(_) => OfpActionType::OFPATOutput,
        }
    }

    fn size_of_sequence(actions: &[Action]) -> usize {
        actions.len() * OFP_ACTION_OUTPUT_LEN as usize
    }

    fn parse(bytes: &mut Cursor<&[u8]>) -> io::Result<Action> {
        let action_code = bytes.read_u16::<BigEndian>()?;
        let len = bytes.read_u16::<BigEndian>()?;
        if action_code != OfpActionType::OFPATOutput as u16 || len != OFP_ACTION_OUTPUT_LEN {
            return Err(invalid(format!("unsupported action type {} (len {})", action_code, len)));
        }
        let port_code = bytes.read_u16::<BigEndian>()?;
        let max_len = bytes.read_u16::<BigEndian>()?;
        Ok(Action::Output(PseudoPort::make(port_code, max_len as u64)?))
    }

    fn parse_sequence(bytes: &mut Cursor<&[u8]>, len: usize) -> io::Result<Vec<Action>> {
        let end = bytes.position() as usize + len;
        let mut actions = vec![];
        while (bytes.position() as usize) < end {
            actions.push(Action::parse(bytes)?);
        }
        Ok(actions)
    }

    fn move_controller_last(acts: &[Action]) -> Vec<Action> {
        let (mut to_ctrl, mut not_to_ctrl): (Vec<Action>, Vec<Action>) = acts.iter()
            .partition(|act| matches!(act, Action::Output(PseudoPort::Controller(_))));
        not_to_ctrl.append(&mut to_ctrl);
        not_to_ctrl
    }

    fn marshal(&self, bytes: &mut Vec<u8>) -> io::Result<()> {
        bytes.write_u16::<BigEndian>(self.type_code() as u16)?;
        bytes.write_u16::<BigEndian>(OFP_ACTION_OUTPUT_LEN)?;
        match *self {
            Action::Output(pp) => {
                bytes.write_u16::<BigEndian>(pp.to_int())?;
                bytes.write_u16::<BigEndian>(match pp {
                    PseudoPort::Controller(w) => w as u16,
                    _ => 0,
                })
            }
        }
    }
}

/// How long before a flow entry expires.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Timeout {
    Permanent,
    ExpiresAfter(u16),
}

impl Timeout {
    fn of_int(tm: u16) -> Timeout {
        match tm {
            0 => Timeout::Permanent,
            d => Timeout::ExpiresAfter(d),
        }
    }

    fn to_int(&self) -> u16 {
        match *self {
            Timeout::Permanent => 0,
            Timeout::ExpiresAfter(d) => d,
        }
    }
}

/// Capabilities supported by the datapath.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub flow_stats: bool,
    pub table_stats: bool,
    pub port_stats: bool,
    pub stp: bool,
    pub ip_reasm: bool,
    pub queue_stats: bool,
    pub arp_match_ip: bool,
}

impl Capabilities {
    fn of_int(d: u32) -> Capabilities {
        Capabilities {
            flow_stats: test_bit(0, d),
            table_stats: test_bit(1, d),
            port_stats: test_bit(2, d),
            stp: test_bit(3, d),
            ip_reasm: test_bit(5, d),
            queue_stats: test_bit(6, d),
            arp_match_ip: test_bit(7, d),
        }
    }

    fn to_int(&self) -> u32 {
        pack(&[(0, self.flow_stats),
               (1, self.table_stats),
               (2, self.port_stats),
               (3, self.stp),
               (5, self.ip_reasm),
               (6, self.queue_stats),
               (7, self.arp_match_ip)])
    }
}

/// Actions supported by the datapath.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupportedActions {
    pub output: bool,
    pub set_vlan_id: bool,
    pub set_vlan_pcp: bool,
    pub strip_vlan: bool,
    pub set_dl_src: bool,
    pub set_dl_dst: bool,
    pub set_nw_src: bool,
    pub set_nw_dst: bool,
    pub set_nw_tos: bool,
    pub set_tp_src: bool,
    pub set_tp_dst: bool,
    pub enqueue: bool,
    pub vendor: bool,
}

impl SupportedActions {
    fn of_int(d: u32) -> SupportedActions {
        SupportedActions {
            output: test_bit(0, d),
            set_vlan_id: test_bit(1, d),
            set_vlan_pcp: test_bit(2, d),
            strip_vlan: test_bit(3, d),
            set_dl_src: test_bit(4, d),
            set_dl_dst: test_bit(5, d),
            set_nw_src: test_bit(6, d),
            set_nw_dst: test_bit(7, d),
            set_nw_tos: test_bit(8, d),
            set_tp_src: test_bit(9, d),
            set_tp_dst: test_bit(10, d),
            enqueue: test_bit(11, d),
            vendor: test_bit(12, d),
        }
    }

    fn to_int(&self) -> u32 {
        pack(&[(0, self.output),
               (1, self.set_vlan_id),
               (2, self.set_vlan_pcp),
               (3, self.strip_vlan),
               (4, self.set_dl_src),
               (5, self.set_dl_dst),
               (6, self.set_nw_src),
               (7, self.set_nw_dst),
               (8, self.set_nw_tos),
               (9, self.set_tp_src),
               (10, self.set_tp_dst),
               (11, self.enqueue),
               (12, self.vendor)])
    }
}

/// Switch features.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchFeatures {
    pub datapath_id: u64,
    pub num_buffers: u32,
    pub num_tables: u8,
    pub supported_capabilities: Capabilities,
    pub supported_actions: SupportedActions,
    pub ports: Vec<PortDesc>,
}

impl MessageType for SwitchFeatures {
    fn parse(bytes: &mut Cursor<&[u8]>) -> io::Result<SwitchFeatures> {
        let datapath_id = bytes.read_u64::<BigEndian>()?;
        let num_buffers = bytes.read_u32::<BigEndian>()?;
        let num_tables = bytes.read_u8()?;
        skip(bytes, 3)?;
        let supported_capabilities = Capabilities::of_int(bytes.read_u32::<BigEndian>()?);
        let supported_actions = SupportedActions::of_int(bytes.read_u32::<BigEndian>()?);
        let mut ports = vec![];
        while remaining(bytes) >= OFP_PHY_PORT_LEN {
            ports.push(PortDesc::parse(bytes)?);
        }
        Ok(SwitchFeatures {
            datapath_id,
            num_buffers,
            num_tables,
            supported_capabilities,
            supported_actions,
            ports,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) -> io::Result<()> {
        bytes.write_u64::<BigEndian>(self.datapath_id)?;
        bytes.write_u32::<BigEndian>(self.num_buffers)?;
        bytes.write_u8(self.num_tables)?;
        bytes.write_all(&[0; 3])?;
        bytes.write_u32::<BigEndian>(self.supported_capabilities.to_int())?;
        bytes.write_u32::<BigEndian>(self.supported_actions.to_int())?;
        for port in &self.ports {
            port.marshal(bytes)?;
        }
        Ok(())
    }
}

/// Type of modification to perform on a flow table.
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FlowModCmd {
    AddFlow,
    ModFlow,
    ModStrictFlow,
    DeleteFlow,
    DeleteStrictFlow,
}

impl FlowModCmd {
    fn of_int(cmd: u16) -> io::Result<FlowModCmd> {
        match cmd {
            0 => Ok(FlowModCmd::AddFlow),
            1 => Ok(FlowModCmd::ModFlow),
            2 => Ok(FlowModCmd::ModStrictFlow),
            3 => Ok(FlowModCmd::DeleteFlow),
            4 => Ok(FlowModCmd::DeleteStrictFlow),
            c => Err(invalid(format!("unknown flow_mod command {}", c))),
        }
    }
}

/// Represents modifications to a flow table from the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowMod {
    pub command: FlowModCmd,
    pub pattern: Pattern,
    pub priority: u16,
    pub actions: Vec<Action>,
    pub cookie: u64,
    pub idle_timeout: Timeout,
    pub hard_timeout: Timeout,
    pub notify_when_removed: bool,
    pub apply_to_packet: Option<u32>,
    pub out_port: Option<PseudoPort>,
    pub check_overlap: bool,
}

impl FlowMod {
    fn flags_to_int(check_overlap: bool, notify_when_removed: bool) -> u16 {
        (if check_overlap { 1 << 1 } else { 0 }) | (if notify_when_removed { 1 << 0 } else { 0 })
    }

    fn check_overlap_of_flags(flags: u16) -> bool {
        2 & flags != 0
    }

    fn notify_when_removed_of_flags(flags: u16) -> bool {
        1 & flags != 0
    }
}

fn buffer_id_of_int(id: i32) -> Option<u32> {
    match id {
        -1 => None,
        n => Some(n as u32),
    }
}

fn buffer_id_to_int(id: Option<u32>) -> i32 {
    match id {
        None => -1,
        Some(n) => n as i32,
    }
}

impl MessageType for FlowMod {
    fn parse(bytes: &mut Cursor<&[u8]>) -> io::Result<FlowMod> {
        let pattern = Pattern::parse(bytes)?;
        let cookie = bytes.read_u64::<BigEndian>()?;
        let command = FlowModCmd::of_int(bytes.read_u16::<BigEndian>()?)?;
        let idle = Timeout::of_int(bytes.read_u16::<BigEndian>()?);
        let hard = Timeout::of_int(bytes.read_u16::<BigEndian>()?);
        let prio = bytes.read_u16::<BigEndian>()?;
        let buffer_id = bytes.read_i32::<BigEndian>()?;
        let out_port = PseudoPort::of_int(bytes.read_u16::<BigEndian>()?)?;
        let flags = bytes.read_u16::<BigEndian>()?;
        let actions_len = remaining(bytes);
        let actions = Action::parse_sequence(bytes, actions_len)?;
        Ok(FlowMod {
            command,
            pattern,
            priority: prio,
            actions,
            cookie,
            idle_timeout: idle,
            hard_timeout: hard,
            notify_when_removed: FlowMod::notify_when_removed_of_flags(flags),
            apply_to_packet: buffer_id_of_int(buffer_id),
            out_port,
            check_overlap: FlowMod::check_overlap_of_flags(flags),
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) -> io::Result<()> {
        self.pattern.marshal(bytes)?;
        bytes.write_u64::<BigEndian>(self.cookie)?;
        bytes.write_u16::<BigEndian>(self.command as u16)?;
        bytes.write_u16::<BigEndian>(self.idle_timeout.to_int())?;
        bytes.write_u16::<BigEndian>(self.hard_timeout.to_int())?;
        bytes.write_u16::<BigEndian>(self.priority)?;
        bytes.write_i32::<BigEndian>(buffer_id_to_int(self.apply_to_packet))?;
        marshal_port(self.out_port.map(|p| p.to_int()), bytes)?;
        bytes.write_u16::<BigEndian>(FlowMod::flags_to_int(self.check_overlap,
                                                           self.notify_when_removed))?;
        for act in Action::move_controller_last(&self.actions) {
            if act == Action::Output(PseudoPort::Table) {
                return Err(invalid("OFPPTable not allowed in installed flow".to_string()));
            }
            act.marshal(bytes)?;
        }
        Ok(())
    }
}

/// The data associated with a packet received by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Buffered(u32, Vec<u8>),
    NotBuffered(Vec<u8>),
}

impl Payload {
    pub fn data(&self) -> &[u8] {
        match *self {
            Payload::Buffered(_, ref buf) |
            Payload::NotBuffered(ref buf) => buf,
        }
    }

    fn buffer_id(&self) -> Option<u32> {
        match *self {
            Payload::Buffered(id, _) => Some(id),
            Payload::NotBuffered(_) => None,
        }
    }

    fn of_parts(buffer_id: Option<u32>, data: Vec<u8>) -> Payload {
        match buffer_id {
            Some(n) => Payload::Buffered(n, data),
            None => Payload::NotBuffered(data),
        }
    }
}

/// The reason a packet arrives at the controller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PacketInReason {
    NoMatch,
    ExplicitSend,
    /// A reason code this version does not define, kept as sent.
    Other(u8),
}

impl PacketInReason {
    fn of_int(code: u8) -> PacketInReason {
        match code {
            0 => PacketInReason::NoMatch,
            1 => PacketInReason::ExplicitSend,
            r => PacketInReason::Other(r),
        }
    }

    fn to_int(self) -> u8 {
        match self {
            PacketInReason::NoMatch => 0,
            PacketInReason::ExplicitSend => 1,
            PacketInReason::Other(r) => r,
        }
    }
}

/// Represents packets received by the datapath and sent to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketIn {
    pub input_payload: Payload,
    pub total_len: u16,
    pub port: u16,
    pub reason: PacketInReason,
}

impl MessageType for PacketIn {
    fn parse(bytes: &mut Cursor<&[u8]>) -> io::Result<PacketIn> {
        let buf_id = buffer_id_of_int(bytes.read_i32::<BigEndian>()?);
        let total_len = bytes.read_u16::<BigEndian>()?;
        let port = bytes.read_u16::<BigEndian>()?;
        let reason = PacketInReason::of_int(bytes.read_u8()?);
        skip(bytes, 1)?;
        Ok(PacketIn {
            input_payload: Payload::of_parts(buf_id, read_rest(bytes)?),
            total_len,
            port,
            reason,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) -> io::Result<()> {
        bytes.write_i32::<BigEndian>(buffer_id_to_int(self.input_payload.buffer_id()))?;
        bytes.write_u16::<BigEndian>(self.total_len)?;
        bytes.write_u16::<BigEndian>(self.port)?;
        bytes.write_u8(self.reason.to_int())?;
        bytes.write_u8(0)?;
        bytes.write_all(self.input_payload.data())
    }
}

/// Send a packet out of the datapath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketOut {
    pub output_payload: Payload,
    pub port_id: Option<u16>,
    pub apply_actions: Vec<Action>,
}

impl MessageType for PacketOut {
    fn parse(bytes: &mut Cursor<&[u8]>) -> io::Result<PacketOut> {
        let buf_id = buffer_id_of_int(bytes.read_i32::<BigEndian>()?);
        let in_port = bytes.read_u16::<BigEndian>()?;
        let actions_len = bytes.read_u16::<BigEndian>()? as usize;
        let apply_actions = Action::parse_sequence(bytes, actions_len)?;
        let data = read_rest(bytes)?;
        Ok(PacketOut {
            output_payload: Payload::of_parts(buf_id, data),
            port_id: if in_port == OfpPort::OFPPNone as u16 { None } else { Some(in_port) },
            apply_actions,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) -> io::Result<()> {
        bytes.write_i32::<BigEndian>(buffer_id_to_int(self.output_payload.buffer_id()))?;
        marshal_port(self.port_id, bytes)?;
        bytes.write_u16::<BigEndian>(Action::size_of_sequence(&self.apply_actions) as u16)?;
        for act in &self.apply_actions {
            act.marshal(bytes)?;
        }
        match self.output_payload {
            Payload::Buffered(..) => Ok(()),
            Payload::NotBuffered(ref data) => bytes.write_all(data),
        }
    }
}

/// Why a flow was removed from the flow table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FlowRemovedReason {
    IdleTimeout,
    HardTimeout,
    Delete,
    Other(u8),
}

impl FlowRemovedReason {
    fn of_int(code: u8) -> FlowRemovedReason {
        match code {
            0 => FlowRemovedReason::IdleTimeout,
            1 => FlowRemovedReason::HardTimeout,
            2 => FlowRemovedReason::Delete,
            r => FlowRemovedReason::Other(r),
        }
    }

    fn to_int(self) -> u8 {
        match self {
            FlowRemovedReason::IdleTimeout => 0,
            FlowRemovedReason::HardTimeout => 1,
            FlowRemovedReason::Delete => 2,
            FlowRemovedReason::Other(r) => r,
        }
    }
}

/// A flow was removed from the datapath's flow table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRemoved {
    pub pattern: Pattern,
    pub cookie: u64,
    pub priority: u16,
    pub reason: FlowRemovedReason,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub idle_timeout: Timeout,
    pub packet_count: u64,
    pub byte_count: u64,
}

impl MessageType for FlowRemoved {
    fn parse(bytes: &mut Cursor<&[u8]>) -> io::Result<FlowRemoved> {
        let pattern = Pattern::parse(bytes)?;
        let cookie = bytes.read_u64::<BigEndian>()?;
        let priority = bytes.read_u16::<BigEndian>()?;
        let reason = FlowRemovedReason::of_int(bytes.read_u8()?);
        skip(bytes, 1)?;
        let duration_sec = bytes.read_u32::<BigEndian>()?;
        let duration_nsec = bytes.read_u32::<BigEndian>()?;
        let idle_timeout = Timeout::of_int(bytes.read_u16::<BigEndian>()?);
        skip(bytes, 2)?;
        let packet_count = bytes.read_u64::<BigEndian>()?;
        let byte_count = bytes.read_u64::<BigEndian>()?;
        Ok(FlowRemoved {
            pattern,
            cookie,
            priority,
            reason,
            duration_sec,
            duration_nsec,
            idle_timeout,
            packet_count,
            byte_count,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) -> io::Result<()> {
        self.pattern.marshal(bytes)?;
        bytes.write_u64::<BigEndian>(self.cookie)?;
        bytes.write_u16::<BigEndian>(self.priority)?;
        bytes.write_u8(self.reason.to_int())?;
        bytes.write_u8(0)?;
        bytes.write_u32::<BigEndian>(self.duration_sec)?;
        bytes.write_u32::<BigEndian>(self.duration_nsec)?;
        bytes.write_u16::<BigEndian>(self.idle_timeout.to_int())?;
        bytes.write_u16::<BigEndian>(0)?;
        bytes.write_u64::<BigEndian>(self.packet_count)?;
        bytes.write_u64::<BigEndian>(self.byte_count)
    }
}

/// An error reported by the datapath. `typ` and `code` are kept raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMsg {
    pub typ: u16,
    pub code: u16,
    pub data: Vec<u8>,
}

impl MessageType for ErrorMsg {
    fn parse(bytes: &mut Cursor<&[u8]>) -> io::Result<ErrorMsg> {
        let typ = bytes.read_u16::<BigEndian>()?;
        let code = bytes.read_u16::<BigEndian>()?;
        Ok(ErrorMsg {
            typ,
            code,
            data: read_rest(bytes)?,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) -> io::Result<()> {
        bytes.write_u16::<BigEndian>(self.typ)?;
        bytes.write_u16::<BigEndian>(self.code)?;
        bytes.write_all(&self.data)
    }
}

/// STP state of a port.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StpState {
    Listen,
    Learn,
    Forward,
    Block,
}

/// Current state of a physical port. Not configurable by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortState {
    pub down: bool,
    pub stp_state: StpState,
}

impl PortState {
    fn of_int(d: u32) -> PortState {
        let stp_state = match (d >> 8) & 3 {
            0 => StpState::Listen,
            1 => StpState::Learn,
            2 => StpState::Forward,
            _ => StpState::Block,
        };
        PortState {
            down: test_bit(0, d),
            stp_state,
        }
    }

    fn to_int(&self) -> u32 {
        pack(&[(0, self.down)]) | ((self.stp_state as u32) << 8)
    }
}

/// Features of physical ports available in a datapath.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortFeatures {
    pub f_10mbhd: bool,
    pub f_10mbfd: bool,
    pub f_100mbhd: bool,
    pub f_100mbfd: bool,
    pub f_1gbhd: bool,
    pub f_1gbfd: bool,
    pub f_10gbfd: bool,
    pub copper: bool,
    pub fiber: bool,
    pub autoneg: bool,
    pub pause: bool,
    pub pause_asym: bool,
}

impl PortFeatures {
    fn of_int(d: u32) -> PortFeatures {
        PortFeatures {
            f_10mbhd: test_bit(0, d),
            f_10mbfd: test_bit(1, d),
            f_100mbhd: test_bit(2, d),
            f_100mbfd: test_bit(3, d),
            f_1gbhd: test_bit(4, d),
            f_1gbfd: test_bit(5, d),
            f_10gbfd: test_bit(6, d),
            copper: test_bit(7, d),
            fiber: test_bit(8, d),
            autoneg: test_bit(9, d),
            pause: test_bit(10, d),
            pause_asym: test_bit(11, d),
        }
    }

    fn to_int(&self) -> u32 {
        pack(&[(0, self.f_10mbhd),
               (1, self.f_10mbfd),
               (2, self.f_100mbhd),
               (3, self.f_100mbfd),
               (4, self.f_1gbhd),
               (5, self.f_1gbfd),
               (6, self.f_10gbfd),
               (7, self.copper),
               (8, self.fiber),
               (9, self.autoneg),
               (10, self.pause),
               (11, self.pause_asym)])
    }
}

/// Flags to indicate behavior of the physical port.
///
/// These flags are used both to describe the current configuration of a physical port,
/// and to configure a port's behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortConfig {
    pub down: bool,
    pub no_stp: bool,
    pub no_recv: bool,
    pub no_recv_stp: bool,
    pub no_flood: bool,
    pub no_fwd: bool,
    pub no_packet_in: bool,
}

impl PortConfig {
    fn of_int(d: u32) -> PortConfig {
        PortConfig {
            down: test_bit(0, d),
            no_stp: test_bit(1, d),
            no_recv: test_bit(2, d),
            no_recv_stp: test_bit(3, d),
            no_flood: test_bit(4, d),
            no_fwd: test_bit(5, d),
            no_packet_in: test_bit(6, d),
        }
    }

    fn to_int(&self) -> u32 {
        pack(&[(0, self.down),
               (1, self.no_stp),
               (2, self.no_recv),
               (3, self.no_recv_stp),
               (4, self.no_flood),
               (5, self.no_fwd),
               (6, self.no_packet_in)])
    }
}

/// Description of a physical port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDesc {
    pub port_no: u16,
    pub hw_addr: [u8; 6],
    pub name: String,
    pub config: PortConfig,
    pub state: PortState,
    pub curr: PortFeatures,
    pub advertised: PortFeatures,
    pub supported: PortFeatures,
    pub peer: PortFeatures,
}

impl PortDesc {
    /// A port with the given number and name and every flag cleared.
    pub fn new(port_no: u16, name: &str) -> PortDesc {
        PortDesc {
            port_no,
            hw_addr: [0; 6],
            name: name.to_string(),
            config: PortConfig::default(),
            state: PortState {
                down: false,
                stp_state: StpState::Listen,
            },
            curr: PortFeatures::default(),
            advertised: PortFeatures::default(),
            supported: PortFeatures::default(),
            peer: PortFeatures::default(),
        }
    }

    fn parse(bytes: &mut Cursor<&[u8]>) -> io::Result<PortDesc> {
        let port_no = bytes.read_u16::<BigEndian>()?;
        let hw_addr = read_mac(bytes)?;
        let name = {
            let mut arr = [0; 16];
            bytes.read_exact(&mut arr)?;
            let end = arr.iter().position(|&b| b == 0).unwrap_or(arr.len());
            String::from_utf8_lossy(&arr[..end]).into_owned()
        };
        let config = PortConfig::of_int(bytes.read_u32::<BigEndian>()?);
        let state = PortState::of_int(bytes.read_u32::<BigEndian>()?);
        let curr = PortFeatures::of_int(bytes.read_u32::<BigEndian>()?);
        let advertised = PortFeatures::of_int(bytes.read_u32::<BigEndian>()?);
        let supported = PortFeatures::of_int(bytes.read_u32::<BigEndian>()?);
        let peer = PortFeatures::of_int(bytes.read_u32::<BigEndian>()?);
        Ok(PortDesc {
            port_no,
            hw_addr,
            name,
            config,
            state,
            curr,
            advertised,
            supported,
            peer,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) -> io::Result<()> {
        bytes.write_u16::<BigEndian>(self.port_no)?;
        bytes.write_all(&self.hw_addr)?;
        let mut name = [0; 16];
        let len = self.name.len().min(15);
        name[..len].copy_from_slice(&self.name.as_bytes()[..len]);
        bytes.write_all(&name)?;
        bytes.write_u32::<BigEndian>(self.config.to_int())?;
        bytes.write_u32::<BigEndian>(self.state.to_int())?;
        bytes.write_u32::<BigEndian>(self.curr.to_int())?;
        bytes.write_u32::<BigEndian>(self.advertised.to_int())?;
        bytes.write_u32::<BigEndian>(self.supported.to_int())?;
        bytes.write_u32::<BigEndian>(self.peer.to_int())
    }
}

/// What changed about a physical port.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PortReason {
    PortAdd,
    PortDelete,
    PortModify,
    /// Unknown reason code. Routed to no port handler.
    Other(u8),
}

impl PortReason {
    fn of_int(code: u8) -> PortReason {
        match code {
            0 => PortReason::PortAdd,
            1 => PortReason::PortDelete,
            2 => PortReason::PortModify,
            r => PortReason::Other(r),
        }
    }

    fn to_int(self) -> u8 {
        match self {
            PortReason::PortAdd => 0,
            PortReason::PortDelete => 1,
            PortReason::PortModify => 2,
            PortReason::Other(r) => r,
        }
    }
}

/// A physical port has changed in the datapath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortStatus {
    pub reason: PortReason,
    pub desc: PortDesc,
}

impl MessageType for PortStatus {
    fn parse(bytes: &mut Cursor<&[u8]>) -> io::Result<PortStatus> {
        let reason = PortReason::of_int(bytes.read_u8()?);
        skip(bytes, 7)?;
        Ok(PortStatus {
            reason,
            desc: PortDesc::parse(bytes)?,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) -> io::Result<()> {
        bytes.write_u8(self.reason.to_int())?;
        bytes.write_all(&[0; 7])?;
        self.desc.marshal(bytes)
    }
}

/// Encapsulates handling of messages implementing `MessageType` trait.
pub mod message {
    use std::io::{self, Cursor, Write};

    use super::*;
    use crate::error::OfpError;
    use crate::ofp_header::{OfpHeader, OFP_VERSION};
    use crate::ofp_message::OfpMessage;

    /// Abstractions of OpenFlow messages mapping to message codes.
    ///
    /// Message types the controller does not interpret are kept as `Other`
    /// with their raw type code and body.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Message {
        Hello,
        Error(ErrorMsg),
        EchoRequest(Vec<u8>),
        EchoReply(Vec<u8>),
        FeaturesReq,
        FeaturesReply(SwitchFeatures),
        FlowMod(FlowMod),
        PacketIn(PacketIn),
        FlowRemoved(FlowRemoved),
        PortStatus(PortStatus),
        PacketOut(PacketOut),
        BarrierRequest,
        BarrierReply,
        Other { code: u8, body: Vec<u8> },
    }

    impl Message {
        /// Map `Message` to the raw OpenFlow message type byte.
        fn type_byte(msg: &Message) -> u8 {
            let code = match *msg {
                Message::Hello => MsgCode::Hello,
                Message::Error(_) => MsgCode::Error,
                Message::EchoRequest(_) => MsgCode::EchoReq,
                Message::EchoReply(_) => MsgCode::EchoResp,
                Message::FeaturesReq => MsgCode::FeaturesReq,
                Message::FeaturesReply(_) => MsgCode::FeaturesResp,
                Message::FlowMod(_) => MsgCode::FlowMod,
                Message::PacketIn(_) => MsgCode::PacketIn,
                Message::FlowRemoved(_) => MsgCode::FlowRemoved,
                Message::PortStatus(_) => MsgCode::PortStatus,
                Message::PacketOut(_) => MsgCode::PacketOut,
                Message::BarrierRequest => MsgCode::BarrierReq,
                Message::BarrierReply => MsgCode::BarrierResp,
                Message::Other { code, .. } => return code,
            };
            code as u8
        }

        /// Short name of the message kind, for logs and errors.
        pub fn kind(&self) -> &'static str {
            match *self {
                Message::Hello => "OFPT_HELLO",
                Message::Error(_) => "OFPT_ERROR",
                Message::EchoRequest(_) => "OFPT_ECHO_REQUEST",
                Message::EchoReply(_) => "OFPT_ECHO_REPLY",
                Message::FeaturesReq => "OFPT_FEATURES_REQUEST",
                Message::FeaturesReply(_) => "OFPT_FEATURES_REPLY",
                Message::FlowMod(_) => "OFPT_FLOW_MOD",
                Message::PacketIn(_) => "OFPT_PACKET_IN",
                Message::FlowRemoved(_) => "OFPT_FLOW_REMOVED",
                Message::PortStatus(_) => "OFPT_PORT_STATUS",
                Message::PacketOut(_) => "OFPT_PACKET_OUT",
                Message::BarrierRequest => "OFPT_BARRIER_REQUEST",
                Message::BarrierReply => "OFPT_BARRIER_REPLY",
                Message::Other { .. } => "OFPT_OTHER",
            }
        }

        /// Marshal the OpenFlow message `msg`.
        fn marshal_body(msg: &Message, bytes: &mut Vec<u8>) -> io::Result<()> {
            match *msg {
                Message::Hello |
                Message::FeaturesReq |
                Message::BarrierRequest |
                Message::BarrierReply => Ok(()),
                Message::EchoRequest(ref buf) |
                Message::EchoReply(ref buf) |
                Message::Other { body: ref buf, .. } => bytes.write_all(buf),
                Message::Error(ref err) => err.marshal(bytes),
                Message::FeaturesReply(ref features) => features.marshal(bytes),
                Message::FlowMod(ref flow_mod) => flow_mod.marshal(bytes),
                Message::PacketIn(ref packet_in) => packet_in.marshal(bytes),
                Message::FlowRemoved(ref flow_removed) => flow_removed.marshal(bytes),
                Message::PortStatus(ref sts) => sts.marshal(bytes),
                Message::PacketOut(ref packet_out) => packet_out.marshal(bytes),
            }
        }

        fn parse_body(code: Option<MsgCode>, typ: u8, buf: &[u8]) -> io::Result<Message> {
            let mut bytes = Cursor::new(buf);
            let msg = match code {
                Some(MsgCode::Hello) => Message::Hello,
                Some(MsgCode::Error) => Message::Error(ErrorMsg::parse(&mut bytes)?),
                Some(MsgCode::EchoReq) => Message::EchoRequest(buf.to_vec()),
                Some(MsgCode::EchoResp) => Message::EchoReply(buf.to_vec()),
                Some(MsgCode::FeaturesReq) => Message::FeaturesReq,
                Some(MsgCode::FeaturesResp) => {
                    Message::FeaturesReply(SwitchFeatures::parse(&mut bytes)?)
                }
                Some(MsgCode::FlowMod) => Message::FlowMod(FlowMod::parse(&mut bytes)?),
                Some(MsgCode::PacketIn) => Message::PacketIn(PacketIn::parse(&mut bytes)?),
                Some(MsgCode::FlowRemoved) => {
                    Message::FlowRemoved(FlowRemoved::parse(&mut bytes)?)
                }
                Some(MsgCode::PortStatus) => Message::PortStatus(PortStatus::parse(&mut bytes)?),
                Some(MsgCode::PacketOut) => Message::PacketOut(PacketOut::parse(&mut bytes)?),
                Some(MsgCode::BarrierReq) => Message::BarrierRequest,
                Some(MsgCode::BarrierResp) => Message::BarrierReply,
                _ => {
                    Message::Other {
                        code: typ,
                        body: buf.to_vec(),
                    }
                }
            };
            Ok(msg)
        }
    }

    impl OfpMessage for Message {
        fn marshal(xid: u32, msg: &Message) -> Result<Vec<u8>, OfpError> {
            let mut body = vec![];
            Message::marshal_body(msg, &mut body)
                .map_err(|e| OfpError::Malformed(format!("cannot encode {}: {}", msg.kind(), e)))?;
            let length = OfpHeader::size() + body.len();
            if length > u16::MAX as usize {
                return Err(OfpError::Malformed(format!("{} too large: {} bytes",
                                                       msg.kind(),
                                                       length)));
            }
            let mut bytes = Vec::with_capacity(length);
            OfpHeader::marshal(&mut bytes,
                               OfpHeader::new(OFP_VERSION,
                                              Message::type_byte(msg),
                                              length as u16,
                                              xid));
            bytes.extend_from_slice(&body);
            Ok(bytes)
        }

        fn parse(header: &OfpHeader, buf: &[u8]) -> Result<(u32, Message), OfpError> {
            let msg = Message::parse_body(header.type_code(), header.typ(), buf)
                .map_err(|e| OfpError::Malformed(format!("message type {}: {}", header.typ(), e)))?;
            Ok((header.xid(), msg))
        }
    }

    /// Return a `FlowMod` adding a flow parameterized by the given `priority`, `pattern`,
    /// and `actions`.
    pub fn add_flow(prio: u16, pattern: Pattern, actions: Vec<Action>) -> FlowMod {
        FlowMod {
            command: FlowModCmd::AddFlow,
            pattern,
            priority: prio,
            actions,
            cookie: 0,
            idle_timeout: Timeout::Permanent,
            hard_timeout: Timeout::Permanent,
            notify_when_removed: false,
            out_port: None,
            apply_to_packet: None,
            check_overlap: false,
        }
    }
}
