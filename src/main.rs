mod api;
mod catalog;
mod commands;
mod console;
mod generate;
mod spike;
mod storage;

use chrono::Local;
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::api::dto::{FieldCreate, FieldUpdate, SpikeScheduleCreate, SpikeScheduleUpdate};
use crate::catalog::CatalogService;
use crate::commands::AppCommand;
use crate::console::AppEvent;
use crate::generate::{DbOverrideProvider, GenerateService};
use crate::spike::SpikeService;

const HELP_TEXT: &str = "可用命令: collections | collection add <name> | collection show <id> | collection rename <id> <name> | collection rm <id> | fields <collection_id> [type] | field add <collection_id> <type> <name> <VALUE_TYPE> [属性=值 ...] | field edit <field_id> [name=..] [type=..] [属性=值 ...] | field rm <field_id> | schedules [collection_id] | schedule add <collection_id> <name> <start> <end> | schedule show <id> | schedule edit <id> [name=..] [start=..] [end=..] | schedule fields <collection_id> | schedule set <schedule_id> <field_id> 属性=值 ... | schedule unset <schedule_id> <field_id> | schedule rm <id> | generate <collection> <type> | quit";

#[tokio::main(flavor = "multi_thread")]
async fn main() -> io::Result<()> {
    let ts = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let log_dir = std::path::PathBuf::from("logs");
    std::fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join(format!("app-{}.log", ts));
    let log_file = std::fs::File::create(log_path)?;
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file))) // 日志重定向到文件，控制台留给交互
        .filter_level(log::LevelFilter::Warn)
        .filter_module("gendata", log::LevelFilter::Info)
        .filter_module("sqlx", log::LevelFilter::Error)
        .filter_module("sea_orm", log::LevelFilter::Error)
        .init();

    // 加载环境变量
    dotenv::dotenv().ok();

    // 初始化数据库
    let db_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://gendata.db?mode=rwc".to_string());
    let db = match storage::establish_connection(&db_url).await {
        Ok(connection) => Arc::new(connection),
        Err(e) => {
            eprintln!("无法连接数据库: {}", e);
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("数据库连接失败: {}", e),
            ));
        }
    };

    // 核心 Channel：控制台 -> actor 命令流，actor -> 控制台事件流
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<AppCommand>();
    let (evt_tx, evt_rx) = mpsc::unbounded_channel::<AppEvent>();

    // 单后台任务模型 (Actor)：所有变更按命令顺序执行
    let db_bg = Arc::clone(&db);
    let evt_tx_bg = evt_tx.clone();
    tokio::spawn(async move {
        let catalog = CatalogService::new(db_bg.clone());
        let spikes = SpikeService::new(db_bg.clone());
        let generator = GenerateService::new(
            db_bg.clone(),
            Arc::new(DbOverrideProvider::new(db_bg.clone())),
        );

        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                AppCommand::CollectionsList => match catalog.list_collections().await {
                    Ok(list) if list.is_empty() => {
                        let _ = evt_tx_bg.send(AppEvent::Message("暂无集合".to_string()));
                    }
                    Ok(list) => {
                        let lines: Vec<String> = list
                            .iter()
                            .map(|c| format!("  [{}] {}", c.id, c.name))
                            .collect();
                        let _ = evt_tx_bg.send(AppEvent::Message(format!(
                            "共 {} 个集合:\n{}",
                            lines.len(),
                            lines.join("\n")
                        )));
                    }
                    Err(e) => {
                        let _ = evt_tx_bg.send(AppEvent::Error(format!("查询失败: {}", e)));
                    }
                },
                AppCommand::CollectionAdd { name } => {
                    match catalog.create_collection(&name).await {
                        Ok(c) => {
                            let _ = evt_tx_bg
                                .send(AppEvent::Message(format!("✓ 集合已创建 [{}]: {}", c.id, c.name)));
                        }
                        Err(e) => {
                            let _ = evt_tx_bg.send(AppEvent::Error(format!("创建失败: {}", e)));
                        }
                    }
                }
                AppCommand::CollectionShow { id } => match catalog.collection_detail(id).await {
                    Ok(detail) => send_json(&evt_tx_bg, &detail),
                    Err(e) => {
                        let _ = evt_tx_bg.send(AppEvent::Error(format!("查询失败: {}", e)));
                    }
                },
                AppCommand::CollectionRename { id, name } => {
                    match catalog.rename_collection(id, &name).await {
                        Ok(c) => {
                            let _ = evt_tx_bg
                                .send(AppEvent::Message(format!("✓ 集合已更名 [{}]: {}", c.id, c.name)));
                        }
                        Err(e) => {
                            let _ = evt_tx_bg.send(AppEvent::Error(format!("更名失败: {}", e)));
                        }
                    }
                }
                AppCommand::CollectionRemove { id } => {
                    match catalog.delete_collection(id).await {
                        Ok(()) => {
                            let _ = evt_tx_bg.send(AppEvent::Message(format!(
                                "✓ 集合已删除 [{}]（字段与调度一并清理）",
                                id
                            )));
                        }
                        Err(e) => {
                            let _ = evt_tx_bg.send(AppEvent::Error(format!("删除失败: {}", e)));
                        }
                    }
                }
                AppCommand::FieldsList {
                    collection_id,
                    collection_type,
                } => match catalog.collection_detail(collection_id).await {
                    Ok(detail) => {
                        let lines: Vec<String> = detail
                            .fields
                            .iter()
                            .filter(|f| match collection_type {
                                Some(ct) => f.collection_type == ct.as_str(),
                                None => true,
                            })
                            .map(|f| {
                                format!(
                                    "  [{}] {} ({}/{}) {}",
                                    f.id, f.field_name, f.collection_type, f.value_type, f.summary
                                )
                            })
                            .collect();
                        if lines.is_empty() {
                            let _ = evt_tx_bg.send(AppEvent::Message("该分区暂无字段".to_string()));
                        } else {
                            let _ = evt_tx_bg.send(AppEvent::Message(lines.join("\n")));
                        }
                    }
                    Err(e) => {
                        let _ = evt_tx_bg.send(AppEvent::Error(format!("查询失败: {}", e)));
                    }
                },
                AppCommand::FieldAdd {
                    collection_id,
                    collection_type,
                    field_name,
                    value_type,
                    attrs,
                } => {
                    let req = FieldCreate {
                        collection_type,
                        field_name,
                        value_type,
                        attrs,
                    };
                    match catalog.create_field(collection_id, &req).await {
                        Ok(f) => {
                            let _ = evt_tx_bg.send(AppEvent::Message(format!(
                                "✓ 字段已创建 [{}]: {} — {}",
                                f.id, f.field_name, f.summary
                            )));
                        }
                        Err(e) => {
                            let _ = evt_tx_bg.send(AppEvent::Error(format!("创建失败: {}", e)));
                        }
                    }
                }
                AppCommand::FieldEdit {
                    field_id,
                    field_name,
                    value_type,
                    attrs,
                } => {
                    let req = FieldUpdate {
                        field_name,
                        value_type,
                        attrs,
                    };
                    match catalog.update_field(field_id, &req).await {
                        Ok(f) => {
                            let _ = evt_tx_bg.send(AppEvent::Message(format!(
                                "✓ 字段已更新 [{}]: {} — {}",
                                f.id, f.field_name, f.summary
                            )));
                        }
                        Err(e) => {
                            let _ = evt_tx_bg.send(AppEvent::Error(format!("更新失败: {}", e)));
                        }
                    }
                }
                AppCommand::FieldRemove { field_id } => {
                    match catalog.delete_field(field_id).await {
                        Ok(()) => {
                            let _ = evt_tx_bg
                                .send(AppEvent::Message(format!("✓ 字段已删除 [{}]", field_id)));
                        }
                        Err(e) => {
                            let _ = evt_tx_bg.send(AppEvent::Error(format!("删除失败: {}", e)));
                        }
                    }
                }
                AppCommand::SchedulesList { collection_id } => {
                    match spikes.list_schedules(collection_id).await {
                        Ok(list) if list.is_empty() => {
                            let _ = evt_tx_bg.send(AppEvent::Message("暂无调度".to_string()));
                        }
                        Ok(list) => {
                            let lines: Vec<String> = list
                                .iter()
                                .map(|s| {
                                    format!(
                                        "  [{}] {} @ {} [{}] {} ~ {}（覆盖 {} 个字段）",
                                        s.id,
                                        s.name,
                                        s.collection_name,
                                        s.status,
                                        s.start_datetime,
                                        s.end_datetime,
                                        s.spike_fields.len()
                                    )
                                })
                                .collect();
                            let _ = evt_tx_bg.send(AppEvent::Message(lines.join("\n")));
                        }
                        Err(e) => {
                            let _ = evt_tx_bg.send(AppEvent::Error(format!("查询失败: {}", e)));
                        }
                    }
                }
                AppCommand::ScheduleAdd {
                    collection_id,
                    name,
                    start,
                    end,
                } => {
                    let req = SpikeScheduleCreate {
                        collection_id,
                        name,
                        start_datetime: start,
                        end_datetime: end,
                        spike_fields: Vec::new(),
                    };
                    match spikes.create_schedule(&req).await {
                        Ok(s) => {
                            let _ = evt_tx_bg.send(AppEvent::Message(format!(
                                "✓ 调度已创建 [{}] [{}]，用 schedule set {} <field_id> 属性=值 配置覆盖",
                                s.id, s.status, s.id
                            )));
                        }
                        Err(e) => {
                            let _ = evt_tx_bg.send(AppEvent::Error(format!("创建失败: {}", e)));
                        }
                    }
                }
                AppCommand::ScheduleShow { id } => match spikes.get_schedule(id).await {
                    Ok(s) => send_json(&evt_tx_bg, &s),
                    Err(e) => {
                        let _ = evt_tx_bg.send(AppEvent::Error(format!("查询失败: {}", e)));
                    }
                },
                AppCommand::ScheduleEdit {
                    id,
                    name,
                    start,
                    end,
                } => {
                    let req = SpikeScheduleUpdate {
                        name,
                        start_datetime: start,
                        end_datetime: end,
                        spike_fields: None,
                    };
                    match spikes.update_schedule(id, &req).await {
                        Ok(s) => {
                            let _ = evt_tx_bg.send(AppEvent::Message(format!(
                                "✓ 调度已更新 [{}] [{}] {} ~ {}",
                                s.id, s.status, s.start_datetime, s.end_datetime
                            )));
                        }
                        Err(e) => {
                            let _ = evt_tx_bg.send(AppEvent::Error(format!("更新失败: {}", e)));
                        }
                    }
                }
                AppCommand::ScheduleFields { collection_id } => {
                    match spikes.editable_fields(collection_id).await {
                        Ok(seeds) if seeds.is_empty() => {
                            let _ = evt_tx_bg.send(AppEvent::Message(
                                "该集合没有可编辑的 Performance 数值字段".to_string(),
                            ));
                        }
                        Ok(seeds) => send_json(&evt_tx_bg, &seeds),
                        Err(e) => {
                            let _ = evt_tx_bg.send(AppEvent::Error(format!("查询失败: {}", e)));
                        }
                    }
                }
                AppCommand::ScheduleSet {
                    schedule_id,
                    field_id,
                    attrs,
                } => match spikes.set_override(schedule_id, field_id, &attrs).await {
                    Ok(_) => {
                        let _ = evt_tx_bg.send(AppEvent::Message(format!(
                            "✓ 覆盖已写入: 调度 {} / 字段 {}",
                            schedule_id, field_id
                        )));
                    }
                    Err(e) => {
                        let _ = evt_tx_bg.send(AppEvent::Error(format!("覆盖写入失败: {}", e)));
                    }
                },
                AppCommand::ScheduleUnset {
                    schedule_id,
                    field_id,
                } => match spikes.remove_override(schedule_id, field_id).await {
                    Ok(_) => {
                        let _ = evt_tx_bg.send(AppEvent::Message(format!(
                            "✓ 覆盖已移除: 调度 {} / 字段 {}",
                            schedule_id, field_id
                        )));
                    }
                    Err(e) => {
                        let _ = evt_tx_bg.send(AppEvent::Error(format!("覆盖移除失败: {}", e)));
                    }
                },
                AppCommand::ScheduleRemove { id } => match spikes.delete_schedule(id).await {
                    Ok(()) => {
                        let _ = evt_tx_bg.send(AppEvent::Message(format!("✓ 调度已删除 [{}]", id)));
                    }
                    Err(e) => {
                        let _ = evt_tx_bg.send(AppEvent::Error(format!("删除失败: {}", e)));
                    }
                },
                AppCommand::Generate {
                    collection,
                    collection_type,
                } => match generator.generate(&collection, collection_type).await {
                    Ok(payload) => send_json(&evt_tx_bg, &payload),
                    Err(e) => {
                        let _ = evt_tx_bg.send(AppEvent::Error(format!("生成失败: {}", e)));
                    }
                },
                AppCommand::Help => {
                    let _ = evt_tx_bg.send(AppEvent::Message(HELP_TEXT.to_string()));
                }
                AppCommand::Quit => {
                    let _ = evt_tx_bg.send(AppEvent::Message("收到退出命令".to_string()));
                }
                AppCommand::Unknown(msg) if msg.is_empty() => {}
                AppCommand::Unknown(msg) => {
                    let _ = evt_tx_bg.send(AppEvent::Error(msg));
                }
            }
        }
    });

    println!("GenData 管理控制台已就绪（输入 help 查看命令，quit 退出）");
    console::run_console_loop(cmd_tx, evt_rx).await?;

    Ok(())
}

fn send_json<T: serde::Serialize>(tx: &mpsc::UnboundedSender<AppEvent>, value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            let _ = tx.send(AppEvent::Payload(json));
        }
        Err(e) => {
            let _ = tx.send(AppEvent::Error(format!("序列化失败: {}", e)));
        }
    }
}
