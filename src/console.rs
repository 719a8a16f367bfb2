use crate::commands::AppCommand;
use std::io;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

/// 后台 actor 回报给控制台的事件
#[derive(Debug, Clone)]
pub enum AppEvent {
    Message(String),
    Error(String),
    /// JSON 输出（show / generate 等）
    Payload(String),
}

/// 行式控制台主循环：读命令、转发 actor、打印事件。
/// quit 直接退出；EOF（管道输入耗尽）同样结束。
pub async fn run_console_loop(
    cmd_tx: mpsc::UnboundedSender<AppCommand>,
    mut evt_rx: mpsc::UnboundedReceiver<AppEvent>,
) -> io::Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            maybe_evt = evt_rx.recv() => {
                match maybe_evt {
                    Some(evt) => print_event(&evt),
                    None => break, // actor 已退出
                }
            }
            maybe_line = lines.next_line() => {
                let Some(line) = maybe_line? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let cmd = line
                    .parse::<AppCommand>()
                    .unwrap_or_else(|_| AppCommand::Unknown(line.to_string()));
                if matches!(cmd, AppCommand::Quit) {
                    break;
                }
                let _ = cmd_tx.send(cmd);
            }
        }
    }

    Ok(())
}

fn print_event(evt: &AppEvent) {
    match evt {
        AppEvent::Message(msg) => println!("{}", msg),
        AppEvent::Error(msg) => eprintln!("✗ {}", msg),
        AppEvent::Payload(json) => println!("{}", json),
    }
}
