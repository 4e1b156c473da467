mod common;

use streamtb::prelude::*;
use streamtb::{
    run_tests, testbench, utils, PhaseManager, QueueSource, Scoreboard, SignalCondition,
    SimConfig, Stream, StreamDriverSlave, StreamMonitor, Transaction,
};

const BURSTS: u64 = 4;
const BEATS: u64 = 4;

fn config() -> SimConfig {
    let addr = [("addr", 32), ("id", 4), ("len", 8), ("size", 3), ("burst", 2)];
    SimConfig::new()
        .suite("sdram")
        .signal("clk", 1)
        .signal("reset", 1)
        .signal("io_initDone", 1)
        .stream("io_axi_aw", &addr)
        .stream("io_axi_w", &[("data", 32), ("strb", 4), ("last", 1)])
        .stream("io_axi_b", &[("id", 4), ("resp", 2)])
        .stream("io_axi_ar", &addr)
        .stream("io_axi_r", &[("data", 32), ("id", 4), ("resp", 2), ("last", 1)])
        .seed(0)
        .print_summary(false)
}

/// Address channel command of an incrementing burst.
struct BurstCmd {
    addr: u64,
    id: u64,
    len: u64,
}

impl From<BurstCmd> for Transaction {
    fn from(cmd: BurstCmd) -> Self {
        Transaction::new()
            .with("addr", cmd.addr)
            .with("id", cmd.id)
            .with("len", cmd.len)
            .with("size", 2)
            .with("burst", 1)
    }
}

fn burst_cmd(addr: u64, id: u64) -> Transaction {
    BurstCmd {
        addr,
        id,
        len: BEATS - 1,
    }
    .into()
}

async fn burst_write_read(dut: SimObject) -> TbResult {
    let clk = dut.c("clk");
    let reset = dut.c("reset");
    Task::fork(testbench::clock_domain_async_reset(
        clk,
        Some(reset),
        SimTime::ns(100),
        10,
        "ns",
    ));
    Task::fork(common::axi_burst_memory(dut, clk, reset, 50));

    let pm = PhaseManager::new(clk)
        .with_watchdog(SimTime::us(50))
        .with_drain_settle(SimTime::ns(200));
    let phase = pm.phase();
    pm.add(SignalCondition::new("initDone", dut.c("io_initDone"), 1));

    let aw = QueueSource::new();
    let w = QueueSource::new();
    let ar = QueueSource::new();
    common::gated_master(Stream::new(dut, "io_axi_aw")?, &phase, &aw, clk, Some(reset));
    common::gated_master(Stream::new(dut, "io_axi_w")?, &phase, &w, clk, Some(reset));
    common::gated_master(Stream::new(dut, "io_axi_ar")?, &phase, &ar, clk, Some(reset));
    StreamDriverSlave::start(Stream::new(dut, "io_axi_b")?, clk, Some(reset));
    StreamDriverSlave::with_policy(
        Stream::new(dut, "io_axi_r")?,
        clk,
        Some(reset),
        streamtb::ReadyPolicy::Random { probability: 0.5 },
    );

    let checks = pm.agent("checks");
    let b = checks.add(Scoreboard::in_order("b").agent());
    let r = checks.add(Scoreboard::in_order("r").agent());
    StreamMonitor::start(Stream::new(dut, "io_axi_b")?, b.observer(), clk, Some(reset));
    StreamMonitor::start(Stream::new(dut, "io_axi_r")?, r.observer(), clk, Some(reset));

    for burst in 0..BURSTS {
        let base = 0x1000 + burst * BEATS * 4;
        aw.push(burst_cmd(base, burst));
        b.push_reference(Transaction::new().with("id", burst).with("resp", 0));
        for beat in 0..BEATS {
            let data = utils::rand_bits(32);
            w.push(
                Transaction::new()
                    .with("data", data)
                    .with("strb", 0xf)
                    .with("last", (beat == BEATS - 1) as u64)
                    .with_next_delay(utils::rand_int(3)),
            );
            r.push_reference(
                Transaction::new()
                    .with("data", data)
                    .with("id", burst)
                    .with("resp", 0)
                    .with("last", (beat == BEATS - 1) as u64),
            );
        }
    }

    // read back once every write was acknowledged
    let reads = ar.clone();
    let writes_done = b.clone();
    Task::fork(async move {
        writes_done.wait_drained(clk).await?;
        for burst in 0..BURSTS {
            reads.push(burst_cmd(0x1000 + burst * BEATS * 4, burst));
        }
        Ok(Val::None)
    });

    let result = pm.run().await;
    if dut.c("io_initDone").u64() != 1 {
        return Err("memory never finished init".into());
    }
    result
}

#[test]
fn axi_burst_memory_round_trip() {
    let report = run_tests!(config(), burst_write_read);
    let t = &report.tests[0];
    assert!(t.passed(), "{:?}", t.result);
    // SETUP waits for initDone after reset and init
    assert!(t.sim_time_ns > 600.0);
}
