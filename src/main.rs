use anyhow::Context;
use chrono::TimeZone;
use clap::{Arg, ArgAction, ArgMatches, Command};
use coroscope::coroutines;
use coroscope::index::HeapIndex;
use coroscope::summary::{summarize, DumpSummary};
use coroscope::{Header, HprofError, LineNum};
use std::fs;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(e) = run(&parse_args()) {
        // the report goes to stdout, so failures do too
        println!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn parse_args() -> ArgMatches {
    Command::new("coroscope")
        .about("Reads a JVM hprof heap dump and prints the kotlinx.coroutines job hierarchy")
        .arg(
            Arg::new("dump-file")
                .long("dump-file")
                .value_name("PATH")
                .required(true)
                .help("Heap dump file to read"),
        )
        .arg(
            Arg::new("list-coroutines")
                .long("list-coroutines")
                .action(ArgAction::SetTrue)
                .help("Also print a flat list of coroutine instances"),
        )
        .arg(
            Arg::new("stack-traces")
                .long("stack-traces")
                .action(ArgAction::SetTrue)
                .help("Also print the recorded stack traces"),
        )
        .get_matches()
}

fn run(args: &ArgMatches) -> anyhow::Result<()> {
    let path = args
        .get_one::<String>("dump-file")
        .expect("dump-file is required");

    let file = fs::File::open(path).with_context(|| format!("could not open {}", path))?;
    // Safety: the analysis is read-only and short-lived; a dump mutated
    // underneath it produces a parse error, not UB on our side.
    let map = unsafe { memmap2::Mmap::map(&file) }
        .with_context(|| format!("could not map {}", path))?;

    let hprof = coroscope::parse_hprof(&map[..])?;

    let summary = summarize(&hprof)?;
    print_header(&hprof.header());
    print_summary(&summary);

    let index = HeapIndex::from_hprof(&hprof)?;

    if args.get_flag("stack-traces") {
        print_stack_traces(&index)?;
    }

    let coroutine_ids = coroutines::coroutine_instances(&index)?;
    log::debug!("found {} coroutine instances", coroutine_ids.len());

    if args.get_flag("list-coroutines") {
        println!("\nCoroutines summary:\n");
        for &id in &coroutine_ids {
            println!("{}", coroutines::format_coroutine(&index, id)?);
        }
    }

    let forest = coroutines::build_forest(&index, &coroutine_ids)?;

    println!("\nHierarchy:\n");
    print!("{}", coroutines::render_hierarchy(&index, &forest)?);

    Ok(())
}

fn print_header(header: &Header) {
    println!();
    println!("Heap Dump Summary:");
    println!();
    println!("Size of identifiers: {}", header.id_size().size_in_bytes());

    let millis = header.timestamp_millis();
    match chrono::Utc.timestamp_millis_opt(millis as i64).single() {
        Some(timestamp) => println!(
            "Milliseconds since 0:00 GMT, 1/1/70: {} ({})",
            millis, timestamp
        ),
        None => println!("Milliseconds since 0:00 GMT, 1/1/70: {}", millis),
    }
    println!();
}

fn print_summary(summary: &DumpSummary) {
    println!(
        "Total number of records in dump: {}",
        summary.num_records
    );
    println!(
        "Number of unique tags in dump:   {}",
        summary.tag_counts.len()
    );
    println!();

    let tag_rows: Vec<(&str, u8, u64)> = summary
        .tag_counts
        .iter()
        .map(|(tag, &count)| (tag.name(), tag.byte(), count))
        .collect();
    print_count_table("tag", &tag_rows);
    println!();

    let sub_tag_rows: Vec<(&str, u8, u64)> = summary
        .sub_tag_counts
        .iter()
        .map(|(sub_tag, &count)| (sub_tag.name(), sub_tag.byte(), count))
        .collect();
    print_count_table("sub-tag", &sub_tag_rows);
}

fn print_count_table(label: &str, rows: &[(&str, u8, u64)]) {
    let name_width = rows
        .iter()
        .map(|(name, _, _)| name.len())
        .max()
        .unwrap_or(0)
        .max(label.len());

    // the name column is padded by 7 to cover the appended " (0xNN)"
    println!("{:<width$} | count", label, width = name_width + 7);
    println!("{:-<width$}+------", "", width = name_width + 8);
    for (name, code, count) in rows {
        println!(
            "{:<width$} (0x{:02X}) | {}",
            name,
            code,
            count,
            width = name_width
        );
    }
}

fn print_stack_traces(index: &HeapIndex) -> Result<(), HprofError> {
    let mut traces: Vec<_> = index.stack_traces().collect();
    traces.sort_by_key(|trace| trace.stack_trace_serial);

    for trace in traces {
        println!();
        println!(
            "stack trace {} (thread {}):",
            trace.stack_trace_serial, trace.thread_serial
        );
        for &frame_id in &trace.frame_ids {
            println!("  {}", format_stack_frame(index, frame_id)?);
        }
    }

    Ok(())
}

fn format_stack_frame(index: &HeapIndex, frame_id: coroscope::Id) -> Result<String, HprofError> {
    let frame = index.stack_frame(frame_id)?;

    let mut line = format!(
        "{}{}",
        index.string(frame.method_name_id())?,
        index.string(frame.method_signature_id())?
    );

    match frame.source_file_name_id() {
        Some(source_id) => {
            let source = index.string(source_id)?;
            match frame.line_num() {
                LineNum::Normal(n) => line.push_str(&format!(" ({}:{})", source, n)),
                _ => line.push_str(&format!(" ({})", source)),
            }
        }
        None => line.push_str(" (no source information)"),
    }

    Ok(line)
}
