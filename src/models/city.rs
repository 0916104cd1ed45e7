use phf::phf_map;

/// 未识别城市时使用的默认城市代码（成都）
pub const DEFAULT_CITY_CODE: &str = "101270100";

/// 城市名称到站点城市代码的映射
static CITY_CODES: phf::Map<&'static str, &'static str> = phf_map! {
    "成都" => "101270100",
    "北京" => "101010100",
    "上海" => "101020100",
    "广州" => "101280100",
    "深圳" => "101280600",
    "杭州" => "101210100",
    "武汉" => "101200100",
    "西安" => "101110100",
    "南京" => "101190100",
    "重庆" => "101040100",
};

/// 按城市名称查找代码
pub fn code_for_name(name: &str) -> Option<&'static str> {
    CITY_CODES.get(name.trim()).copied()
}

/// 判断输入本身是否已经是城市代码
pub fn looks_like_code(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_city() {
        assert_eq!(code_for_name("成都"), Some("101270100"));
        assert_eq!(code_for_name(" 深圳 "), Some("101280600"));
    }

    #[test]
    fn test_unknown_city() {
        assert_eq!(code_for_name("拉萨"), None);
    }

    #[test]
    fn test_looks_like_code() {
        assert!(looks_like_code("101010100"));
        assert!(!looks_like_code("chengdu-code"));
        assert!(!looks_like_code(""));
    }
}
