#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};

use streamtb::prelude::*;
use streamtb::source::PhaseGated;
use streamtb::{
    PhaseHandle, QueueSource, Scoreboard, Stream, StreamDriverMaster, StreamMonitor, Transaction,
};

/// Sink side of a DUT port.
pub struct InPort {
    stream: Stream,
}

impl InPort {
    pub fn new(stream: Stream) -> Self {
        InPort { stream }
    }
    /// Transaction accepted on this edge, if any.
    pub fn take(&self) -> Option<Transaction> {
        self.stream.fire().then(|| self.stream.sample())
    }
    pub fn set_ready(&self, ready: bool) {
        self.stream.ready().set_bool(ready);
    }
}

/// Source side of a DUT port, holds its payload until accepted.
pub struct OutPort {
    stream: Stream,
    current: Option<Transaction>,
}

impl OutPort {
    pub fn new(stream: Stream) -> Self {
        OutPort {
            stream,
            current: None,
        }
    }
    /// Call first on every edge, drops the transaction that was accepted.
    pub fn on_edge(&mut self) {
        if self.current.is_some() && self.stream.fire() {
            self.current = None;
        }
    }
    pub fn is_free(&self) -> bool {
        self.current.is_none()
    }
    pub fn offer(&mut self, t: Transaction) -> Result<(), TbError> {
        self.stream.drive(&t)?;
        self.current = Some(t);
        Ok(())
    }
    pub fn update_valid(&self) {
        self.stream.valid().set_bool(self.current.is_some());
    }
    pub fn clear(&mut self) {
        self.current = None;
        self.stream.valid().set(0);
    }
}

fn in_reset(reset: Option<SimObject>) -> bool {
    reset.map_or(false, |r| r.is_high())
}

/// Registered FIFO from `input` to `output`, `map` is applied on the way.
pub async fn fifo(
    input: Stream,
    output: Stream,
    clk: SimObject,
    reset: Option<SimObject>,
    depth: usize,
    map: impl Fn(Transaction) -> Transaction,
) -> TbResult {
    let inp = InPort::new(input);
    let mut out = OutPort::new(output);
    let mut queue = VecDeque::new();
    loop {
        clk.rising_edge().await;
        if in_reset(reset) {
            queue.clear();
            out.clear();
            inp.set_ready(false);
            continue;
        }
        out.on_edge();
        if let Some(t) = inp.take() {
            queue.push_back(map(t));
        }
        if out.is_free() {
            if let Some(t) = queue.pop_front() {
                out.offer(t)?;
            }
        }
        out.update_valid();
        inp.set_ready(queue.len() < depth);
    }
}

/// UDP loopback application: echoes commands with ports swapped and the data
/// stream unchanged.
pub fn udp_loopback(dut: SimObject, clk: SimObject, reset: Option<SimObject>) -> Result<(), TbError> {
    let cmd_in = Stream::new(dut, "io_rx_cmd")?;
    let cmd_out = Stream::new(dut, "io_tx_cmd")?;
    let data_in = Stream::new(dut, "io_rx_data")?;
    let data_out = Stream::new(dut, "io_tx_data")?;
    Task::fork(fifo(cmd_in, cmd_out, clk, reset, 2, |mut t| {
        let src = t.get("srcPort").unwrap_or(0);
        let dst = t.get("dstPort").unwrap_or(0);
        t.set("srcPort", dst);
        t.set("dstPort", src);
        t
    }));
    Task::fork(fifo(data_in, data_out, clk, reset, 4, |t| t));
    Ok(())
}

/// AXI4-Lite register file on `<prefix>_{aw,w,b,ar,r}`.
pub async fn axi_lite_regs(
    dut: SimObject,
    prefix: &str,
    clk: SimObject,
    init: Vec<(u64, u64)>,
) -> TbResult {
    let aw = InPort::new(Stream::new(dut, &format!("{}_aw", prefix))?);
    let w = InPort::new(Stream::new(dut, &format!("{}_w", prefix))?);
    let ar = InPort::new(Stream::new(dut, &format!("{}_ar", prefix))?);
    let mut b = OutPort::new(Stream::new(dut, &format!("{}_b", prefix))?);
    let mut r = OutPort::new(Stream::new(dut, &format!("{}_r", prefix))?);
    let mut regs: HashMap<u64, u64> = init.into_iter().collect();
    let mut addrs = VecDeque::new();
    let mut datas = VecDeque::new();
    let mut reads = VecDeque::new();
    loop {
        clk.rising_edge().await;
        b.on_edge();
        r.on_edge();
        addrs.extend(aw.take().and_then(|t| t.get("addr")));
        datas.extend(w.take().and_then(|t| t.get("data")));
        reads.extend(ar.take().and_then(|t| t.get("addr")));
        if b.is_free() && !addrs.is_empty() && !datas.is_empty() {
            if let (Some(addr), Some(data)) = (addrs.pop_front(), datas.pop_front()) {
                regs.insert(addr, data);
                b.offer(Transaction::new().with("resp", 0))?;
            }
        }
        if r.is_free() {
            if let Some(addr) = reads.pop_front() {
                let data = regs.get(&addr).copied().unwrap_or(0);
                r.offer(Transaction::new().with("data", data).with("resp", 0))?;
            }
        }
        b.update_valid();
        r.update_valid();
        aw.set_ready(addrs.len() < 2);
        w.set_ready(datas.len() < 2);
        ar.set_ready(reads.len() < 2);
    }
}

/// Bus master over the five AXI4-Lite channels, fed through queues.
pub struct AxiLiteMaster {
    aw: QueueSource,
    w: QueueSource,
    ar: QueueSource,
    pub reads: Scoreboard<Transaction>,
    pub writes: Scoreboard<Transaction>,
}

impl AxiLiteMaster {
    pub fn start(
        dut: SimObject,
        prefix: &str,
        clk: SimObject,
        reset: Option<SimObject>,
    ) -> Result<Self, TbError> {
        let stream = |ch: &str| Stream::new(dut, &format!("{}_{}", prefix, ch));
        let master = AxiLiteMaster {
            aw: QueueSource::new(),
            w: QueueSource::new(),
            ar: QueueSource::new(),
            reads: Scoreboard::in_order("axi_lite_r"),
            writes: Scoreboard::in_order("axi_lite_b"),
        };
        StreamDriverMaster::start(stream("aw")?, master.aw.clone(), clk, reset);
        StreamDriverMaster::start(stream("w")?, master.w.clone(), clk, reset);
        StreamDriverMaster::start(stream("ar")?, master.ar.clone(), clk, reset);
        streamtb::StreamDriverSlave::start(stream("b")?, clk, reset);
        streamtb::StreamDriverSlave::start(stream("r")?, clk, reset);
        StreamMonitor::start(stream("b")?, master.writes.observer(), clk, reset);
        StreamMonitor::start(stream("r")?, master.reads.observer(), clk, reset);
        Ok(master)
    }

    pub fn write(&self, addr: u64, data: u64) {
        self.aw.push(Transaction::new().with("addr", addr));
        self.w.push(Transaction::new().with("data", data).with("strb", 0xf));
        self.writes.push_reference(Transaction::new().with("resp", 0));
    }

    pub fn read(&self, addr: u64) {
        self.ar.push(Transaction::new().with("addr", addr));
        self.reads.push_reference(Transaction::new().with("resp", 0));
    }

    pub fn read_assert(&self, addr: u64, data: u64) {
        self.ar.push(Transaction::new().with("addr", addr));
        self.reads
            .push_reference(Transaction::new().with("data", data).with("resp", 0));
    }

    pub fn is_idle(&self) -> bool {
        self.reads.is_drained() && self.writes.is_drained()
    }
}

/// AXI4 burst memory that raises `io_initDone` `init_cycles` cycles after reset.
pub async fn axi_burst_memory(
    dut: SimObject,
    clk: SimObject,
    reset: SimObject,
    init_cycles: u32,
) -> TbResult {
    let aw = InPort::new(Stream::new(dut, "io_axi_aw")?);
    let w = InPort::new(Stream::new(dut, "io_axi_w")?);
    let ar = InPort::new(Stream::new(dut, "io_axi_ar")?);
    let mut b = OutPort::new(Stream::new(dut, "io_axi_b")?);
    let mut r = OutPort::new(Stream::new(dut, "io_axi_r")?);
    let init_done = dut.c("io_initDone");

    let mut mem: HashMap<u64, u64> = HashMap::new();
    let mut write_bursts: VecDeque<Transaction> = VecDeque::new();
    let mut beat = 0u64;
    let mut read_bursts: VecDeque<(Transaction, u64)> = VecDeque::new();
    let mut cycles = 0;
    loop {
        clk.rising_edge().await;
        if reset.is_high() {
            cycles = 0;
            init_done.set(0);
            continue;
        }
        if cycles < init_cycles {
            cycles += 1;
            if cycles == init_cycles {
                init_done.set(1);
            }
            continue;
        }
        b.on_edge();
        r.on_edge();
        if let Some(t) = aw.take() {
            write_bursts.push_back(t);
        }
        if let Some(t) = w.take() {
            match write_bursts.front() {
                Some(burst) => {
                    let addr = burst.get("addr").unwrap_or(0) + beat * 4;
                    mem.insert(addr, t.get("data").unwrap_or(0));
                    beat += 1;
                    if t.last() {
                        let id = burst.get("id").unwrap_or(0);
                        write_bursts.pop_front();
                        beat = 0;
                        // b has room, w is only accepted when it has
                        b.offer(Transaction::new().with("id", id).with("resp", 0))?;
                    }
                }
                None => return Err("write data without address".into()),
            }
        }
        if let Some(t) = ar.take() {
            read_bursts.push_back((t, 0));
        }
        if r.is_free() {
            if let Some((burst, i)) = read_bursts.front_mut() {
                let len = burst.get("len").unwrap_or(0);
                let addr = burst.get("addr").unwrap_or(0) + *i * 4;
                r.offer(
                    Transaction::new()
                        .with("data", mem.get(&addr).copied().unwrap_or(0))
                        .with("id", burst.get("id").unwrap_or(0))
                        .with("resp", 0)
                        .with("last", (*i == len) as u64),
                )?;
                *i += 1;
                if *i > len {
                    read_bursts.pop_front();
                }
            }
        }
        b.update_valid();
        r.update_valid();
        aw.set_ready(write_bursts.len() < 2);
        w.set_ready(!write_bursts.is_empty() && b.is_free());
        ar.set_ready(read_bursts.is_empty());
    }
}

/// Master that only starts sending once the run is in SIM.
pub fn gated_master(
    stream: Stream,
    phase: &PhaseHandle,
    queue: &QueueSource,
    clk: SimObject,
    reset: Option<SimObject>,
) -> StreamDriverMaster {
    StreamDriverMaster::start(
        stream,
        PhaseGated::new(phase.clone(), queue.clone()),
        clk,
        reset,
    )
}
