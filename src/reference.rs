//! Static reference data: sectors, their keywords and leaders, and the
//! securities those leaders map to.
//!
//! There is exactly one authoritative dataset per process. The built-in one
//! is constructed lazily on first use and only ever read afterwards, so it
//! can be shared between workers without locking. An alternative dataset can
//! be loaded from YAML; it replaces the built-in one instead of merging.
//!
//! Sector order matters: the classifier breaks score ties in favour of the
//! sector registered first.

use crate::error::ConfigError;
use itertools::Itertools;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

/// A sector with the vocabulary that points to it and its bellwether names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorProfile {
    pub sector_name: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub leaders: Vec<String>,
}

/// Mapping from a display name to a tradable symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityRef {
    pub display_name: String,
    pub symbol: String,
    pub sector: String,
    #[serde(default)]
    pub sub_sector: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ReferenceFile {
    sectors: Vec<SectorProfile>,
    securities: Vec<SecurityRef>,
}

/// The sector and security tables, indexed for lookups.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    sectors: Vec<SectorProfile>,
    securities: Vec<SecurityRef>,
    by_name: HashMap<String, usize>,
}

static BUILTIN: Lazy<ReferenceData> = Lazy::new(builtin_dataset);

impl ReferenceData {
    /// Build a dataset, dropping duplicate sectors and duplicate keywords.
    ///
    /// A display name that appears twice keeps its first symbol.
    pub fn new(sectors: Vec<SectorProfile>, securities: Vec<SecurityRef>) -> Self {
        let sectors: Vec<SectorProfile> = sectors
            .into_iter()
            .unique_by(|s| s.sector_name.clone())
            .map(|mut s| {
                s.keywords = s
                    .keywords
                    .into_iter()
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .unique_by(|k| k.to_lowercase())
                    .collect();
                s
            })
            .collect();

        let mut by_name = HashMap::new();
        for (i, security) in securities.iter().enumerate() {
            by_name.entry(security.display_name.clone()).or_insert(i);
        }

        let data = Self {
            sectors,
            securities,
            by_name,
        };
        for sector in &data.sectors {
            for leader in &sector.leaders {
                if data.resolve(leader).is_none() {
                    warn!(sector = %sector.sector_name, %leader, "Leader has no symbol in reference data");
                }
            }
        }
        data
    }

    /// The process-wide built-in dataset.
    pub fn builtin() -> &'static ReferenceData {
        &BUILTIN
    }

    /// Load a replacement dataset from a YAML file with `sectors` and `securities` lists.
    #[instrument(level = "info", skip_all, fields(path = %path))]
    pub fn from_yaml_file(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        let data = Self::from_yaml(&raw)?;
        info!(
            sectors = data.sectors.len(),
            securities = data.securities.len(),
            "Loaded reference data"
        );
        Ok(data)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let file: ReferenceFile = serde_yaml::from_str(raw)?;
        if file.sectors.is_empty() {
            return Err(ConfigError::Invalid("reference data has no sectors".into()));
        }
        Ok(Self::new(file.sectors, file.securities))
    }

    /// Sectors in registration order.
    pub fn sectors(&self) -> &[SectorProfile] {
        &self.sectors
    }

    pub fn sector(&self, name: &str) -> Option<&SectorProfile> {
        self.sectors.iter().find(|s| s.sector_name == name)
    }

    /// Leaders of a sector, empty for unknown sectors.
    pub fn leaders(&self, sector: &str) -> &[String] {
        self.sector(sector).map(|s| s.leaders.as_slice()).unwrap_or(&[])
    }

    pub fn resolve(&self, display_name: &str) -> Option<&SecurityRef> {
        self.by_name.get(display_name).map(|&i| &self.securities[i])
    }

    pub fn securities(&self) -> &[SecurityRef] {
        &self.securities
    }
}

fn sector(name: &str, keywords: &[&str], leaders: &[&str]) -> SectorProfile {
    SectorProfile {
        sector_name: name.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        leaders: leaders.iter().map(|l| l.to_string()).collect(),
    }
}

fn security(name: &str, symbol: &str, sector: &str, sub_sector: Option<&str>) -> SecurityRef {
    SecurityRef {
        display_name: name.to_string(),
        symbol: symbol.to_string(),
        sector: sector.to_string(),
        sub_sector: sub_sector.map(str::to_string),
    }
}

fn builtin_dataset() -> ReferenceData {
    let sectors = vec![
        sector(
            "科技",
            &[
                "科技", "人工智能", "AI", "ChatGPT", "芯片", "半导体", "5G", "互联网", "软件",
                "硬件", "云计算", "大数据", "区块链", "元宇宙", "VR", "AR",
            ],
            &["腾讯", "阿里巴巴", "百度", "京东", "美团", "小米", "网易", "快手"],
        ),
        sector(
            "汽车",
            &[
                "汽车", "新能源", "电动车", "特斯拉", "比亚迪", "蔚来", "小鹏", "理想",
                "自动驾驶", "智能汽车", "充电桩", "电池",
            ],
            &["特斯拉", "比亚迪", "蔚来", "小鹏", "理想", "长城汽车", "吉利汽车"],
        ),
        sector(
            "房地产",
            &[
                "房地产", "房价", "楼市", "地产", "万科", "恒大", "碧桂园", "保利", "融创",
                "住宅", "商业地产", "物业",
            ],
            &["万科", "恒大", "碧桂园", "保利", "融创", "龙湖"],
        ),
        sector(
            "金融",
            &[
                "银行", "保险", "证券", "基金", "投资", "理财", "金融", "支付", "数字货币",
                "央行", "利率", "汇率",
            ],
            &["工商银行", "建设银行", "中国银行", "招商银行", "平安银行", "中国平安"],
        ),
        sector(
            "医疗",
            &[
                "医疗", "医药", "疫苗", "医院", "药品", "医疗器械", "生物医药", "康美", "恒瑞",
                "药明康德", "爱尔眼科",
            ],
            &["恒瑞医药", "药明康德", "爱尔眼科", "迈瑞医疗", "康美药业"],
        ),
        sector(
            "教育",
            &[
                "教育", "学校", "培训", "在线教育", "新东方", "好未来", "猿辅导", "作业帮",
                "教育科技",
            ],
            &[],
        ),
        sector(
            "消费",
            &[
                "消费", "零售", "电商", "淘宝", "京东", "拼多多", "美团", "饿了么", "直播",
                "网红", "品牌",
            ],
            &["贵州茅台", "五粮液", "伊利股份", "蒙牛乳业", "海天味业"],
        ),
        sector(
            "能源",
            &[
                "能源", "石油", "天然气", "煤炭", "电力", "新能源", "光伏", "风电", "核电",
                "中石油", "中石化",
            ],
            &["中国石油", "中国石化", "中国神华", "隆基绿能", "通威股份"],
        ),
        sector(
            "食品",
            &[
                "食品", "饮料", "白酒", "茅台", "五粮液", "伊利", "蒙牛", "康师傅", "统一",
                "餐饮", "外卖",
            ],
            &[],
        ),
        sector(
            "旅游",
            &[
                "旅游", "酒店", "航空", "携程", "去哪儿", "同程", "春秋航空", "中国国旅",
                "景区", "度假",
            ],
            &[],
        ),
    ];

    let securities = vec![
        security("腾讯", "00700.HK", "科技", Some("互联网")),
        security("阿里巴巴", "09988.HK", "科技", Some("电商")),
        security("百度", "09888.HK", "科技", Some("互联网")),
        security("京东", "09618.HK", "科技", Some("电商")),
        security("美团", "03690.HK", "科技", Some("本地生活")),
        security("小米", "01810.HK", "科技", Some("消费电子")),
        security("网易", "09999.HK", "科技", Some("游戏")),
        security("快手", "01024.HK", "科技", Some("短视频")),
        security("中芯国际", "688981.SH", "科技", Some("半导体")),
        security("比亚迪", "002594.SZ", "汽车", Some("新能源汽车")),
        security("宁德时代", "300750.SZ", "汽车", Some("动力电池")),
        security("特斯拉", "TSLA", "汽车", Some("新能源汽车")),
        security("蔚来", "NIO", "汽车", Some("新能源汽车")),
        security("小鹏", "XPEV", "汽车", Some("新能源汽车")),
        security("理想", "LI", "汽车", Some("新能源汽车")),
        security("长城汽车", "601633.SH", "汽车", Some("整车")),
        security("吉利汽车", "00175.HK", "汽车", Some("整车")),
        security("万科", "000002.SZ", "房地产", Some("住宅开发")),
        security("恒大", "03333.HK", "房地产", Some("住宅开发")),
        security("碧桂园", "02007.HK", "房地产", Some("住宅开发")),
        security("保利", "600048.SH", "房地产", Some("住宅开发")),
        security("融创", "01918.HK", "房地产", Some("住宅开发")),
        security("龙湖", "00960.HK", "房地产", Some("商业地产")),
        security("工商银行", "601398.SH", "金融", Some("银行")),
        security("建设银行", "601939.SH", "金融", Some("银行")),
        security("中国银行", "601988.SH", "金融", Some("银行")),
        security("招商银行", "600036.SH", "金融", Some("银行")),
        security("平安银行", "000001.SZ", "金融", Some("银行")),
        security("中国平安", "601318.SH", "金融", Some("保险")),
        security("恒瑞医药", "600276.SH", "医疗", Some("创新药")),
        security("药明康德", "603259.SH", "医疗", Some("医药外包")),
        security("爱尔眼科", "300015.SZ", "医疗", Some("医疗服务")),
        security("迈瑞医疗", "300760.SZ", "医疗", Some("医疗器械")),
        security("康美药业", "600518.SH", "医疗", Some("中药")),
        security("贵州茅台", "600519.SH", "消费", Some("白酒")),
        security("五粮液", "000858.SZ", "消费", Some("白酒")),
        security("伊利股份", "600887.SH", "消费", Some("乳制品")),
        security("蒙牛乳业", "02319.HK", "消费", Some("乳制品")),
        security("海天味业", "603288.SH", "消费", Some("调味品")),
        security("中国石油", "601857.SH", "能源", Some("油气")),
        security("中国石化", "600028.SH", "能源", Some("油气")),
        security("中国神华", "601088.SH", "能源", Some("煤炭")),
        security("隆基绿能", "601012.SH", "能源", Some("光伏")),
        security("通威股份", "600438.SH", "能源", Some("光伏")),
    ];

    ReferenceData::new(sectors, securities)
}
